//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Códigos HTTP/1.1 que genera el motor. Los CGI pueden devolver
//! cualquier otro código vía `Status:`; para esos se usa
//! [`reason_phrase_for`].
//!
//! - **1xx**: `100 Continue` (Expect) y `101` (WebSocket)
//! - **2xx**: éxito, incluyendo `206` (Range) y `207` (PROPFIND)
//! - **3xx**: redirecciones y `304 Not Modified`
//! - **4xx**: errores del cliente
//! - **5xx**: errores del servidor

/// Códigos de estado que emite el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue - Respuesta interina a `Expect: 100-continue`
    Continue = 100,

    /// 101 Switching Protocols - Handshake WebSocket aceptado
    SwitchingProtocols = 101,

    /// 200 OK - La petición fue exitosa
    Ok = 200,

    /// 201 Created - PUT creó un archivo nuevo
    Created = 201,

    /// 204 No Content - Petición exitosa sin contenido en el body
    NoContent = 204,

    /// 206 Partial Content - Respuesta a un `Range`
    PartialContent = 206,

    /// 207 Multi-Status - Respuesta WebDAV a PROPFIND
    MultiStatus = 207,

    /// 301 Moved Permanently - Directorio pedido sin `/` final
    MovedPermanently = 301,

    /// 302 Found - Redirección a HTTPS o `Location` de un CGI
    Found = 302,

    /// 304 Not Modified - Petición condicional satisfecha
    NotModified = 304,

    /// 400 Bad Request - Request line o headers malformados
    BadRequest = 400,

    /// 401 Unauthorized - Falta autenticación digest o es inválida
    Unauthorized = 401,

    /// 403 Forbidden - Listado de directorio deshabilitado
    Forbidden = 403,

    /// 404 Not Found - Recurso inexistente u oculto
    NotFound = 404,

    /// 411 Length Required - Body sin `Content-Length`
    LengthRequired = 411,

    /// 416 Range Not Satisfiable - Rango que empieza después del final
    RangeNotSatisfiable = 416,

    /// 417 Expectation Failed - `Expect` distinto de `100-continue`
    ExpectationFailed = 417,

    /// 426 Upgrade Required - Versión de WebSocket no soportada
    UpgradeRequired = 426,

    /// 500 Internal Server Error - Error interno del servidor
    InternalServerError = 500,

    /// 501 Not Implemented - Método no soportado por el handler
    NotImplemented = 501,

    /// 505 HTTP Version Not Supported - Versión distinta de 1.0/1.1
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    const ALL: [StatusCode; 21] = [
        StatusCode::Continue,
        StatusCode::SwitchingProtocols,
        StatusCode::Ok,
        StatusCode::Created,
        StatusCode::NoContent,
        StatusCode::PartialContent,
        StatusCode::MultiStatus,
        StatusCode::MovedPermanently,
        StatusCode::Found,
        StatusCode::NotModified,
        StatusCode::BadRequest,
        StatusCode::Unauthorized,
        StatusCode::Forbidden,
        StatusCode::NotFound,
        StatusCode::LengthRequired,
        StatusCode::RangeNotSatisfiable,
        StatusCode::ExpectationFailed,
        StatusCode::UpgradeRequired,
        StatusCode::InternalServerError,
        StatusCode::NotImplemented,
        StatusCode::HttpVersionNotSupported,
    ];

    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use httpd_engine::http::StatusCode;
    /// assert_eq!(StatusCode::PartialContent.as_u16(), 206);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Busca la variante para un código numérico
    pub fn from_u16(code: u16) -> Option<StatusCode> {
        Self::ALL.iter().copied().find(|status| status.as_u16() == code)
    }

    /// Retorna el texto de razón (reason phrase) asociado al código
    ///
    /// # Ejemplo
    /// ```
    /// use httpd_engine::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotModified.reason_phrase(), "Not Modified");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::MultiStatus => "Multi-Status",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::RangeNotSatisfiable => "Requested Range Not Satisfiable",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::UpgradeRequired => "Upgrade Required",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// `true` para códigos cuya respuesta nunca lleva body (1xx, 204, 304)
    pub fn forbids_body(&self) -> bool {
        code_forbids_body(self.as_u16())
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

/// Reason phrase para un código arbitrario
pub fn reason_phrase_for(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .map(|status| status.reason_phrase())
        .unwrap_or("Unknown")
}

pub(crate) fn code_forbids_body(code: u16) -> bool {
    code < 200 || code == 204 || code == 304
}

impl std::fmt::Display for StatusCode {
    /// Formatea el código de estado para mostrarlo
    ///
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
