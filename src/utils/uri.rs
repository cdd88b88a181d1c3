//! # Utilidades de URI
//! src/utils/uri.rs
//!
//! Decodificación percent-encoding, codificación para hrefs de listados,
//! normalización de paths contra traversal, listas de opciones separadas
//! por comas y extracción de variables de formularios/cookies.

/// Decodifica una secuencia percent-encoded.
///
/// Si `is_form_url_encoded` es `true`, también convierte `+` en espacio
/// (formato `application/x-www-form-urlencoded`). Secuencias `%` inválidas
/// se copian tal cual.
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::url_decode;
///
/// assert_eq!(url_decode("/a%20b", false), "/a b");
/// assert_eq!(url_decode("x+y", true), "x y");
/// assert_eq!(url_decode("x+y", false), "x+y");
/// ```
pub fn url_decode(src: &str, is_form_url_encoded: bool) -> String {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() && is_hex(bytes[i + 1]) && is_hex(bytes[i + 2]) => {
                out.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
                i += 3;
            }
            b'+' if is_form_url_encoded => {
                out.push(b' ');
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_hex(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => c.to_ascii_lowercase() - b'a' + 10,
    }
}

/// Codifica un nombre de archivo para usarlo en un `href`.
///
/// Se dejan sin escapar los alfanuméricos y `._-$,;~()`.
pub fn url_encode(src: &str) -> String {
    const DONT_ESCAPE: &[u8] = b"._-$,;~()";
    const HEX: &[u8] = b"0123456789abcdef";

    let mut out = String::with_capacity(src.len());
    for &c in src.as_bytes() {
        if c.is_ascii_alphanumeric() || DONT_ESCAPE.contains(&c) {
            out.push(c as char);
        } else {
            out.push('%');
            out.push(HEX[(c >> 4) as usize] as char);
            out.push(HEX[(c & 0x0f) as usize] as char);
        }
    }
    out
}

/// Colapsa `..` y separadores repetidos en un path ya decodificado.
///
/// Tras cada separador se descartan las barras y los pares `..` que le
/// siguen, así que el resultado nunca contiene `/..` ni `//`.
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::uri::remove_double_dots_and_double_slashes;
///
/// assert_eq!(remove_double_dots_and_double_slashes("/a/../../etc//passwd"), "/a/etc/passwd");
/// ```
pub fn remove_double_dots_and_double_slashes(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        out.push(c);
        i += 1;
        if c == b'/' || c == b'\\' {
            loop {
                match &bytes[i..] {
                    [b'/' | b'\\', ..] => i += 1,
                    [b'.', b'.', ..] => i += 2,
                    _ => break,
                }
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Itera sobre una lista de opciones `a,b=c,d`.
///
/// Cada elemento se entrega como `(clave, valor)`; el valor es `None`
/// cuando el elemento no contiene `=`. Solo se separa en el primer `=`.
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::split_option_list;
///
/// let items: Vec<_> = split_option_list("index.html,/cgi=/srv/cgi,x=y=z").collect();
/// assert_eq!(items, vec![
///     ("index.html", None),
///     ("/cgi", Some("/srv/cgi")),
///     ("x", Some("y=z")),
/// ]);
/// ```
pub fn split_option_list(list: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    list.split(',')
        .filter(|item| !item.is_empty())
        .map(|item| match item.find('=') {
            Some(eq) => (&item[..eq], Some(&item[eq + 1..])),
            None => (item, None),
        })
}

/// Busca una variable en datos `application/x-www-form-urlencoded`
/// (query string o body de un POST). El nombre se compara sin distinguir
/// mayúsculas.
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::uri::get_var;
///
/// assert_eq!(get_var("a=1&name=John+Doe", "NAME"), Some("John Doe".to_string()));
/// assert_eq!(get_var("a=1", "b"), None);
/// ```
pub fn get_var(data: &str, name: &str) -> Option<String> {
    data.split('&').find_map(|pair| {
        let (key, value) = match pair.find('=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => return None,
        };
        if key.eq_ignore_ascii_case(name) {
            Some(url_decode(value, true))
        } else {
            None
        }
    })
}

/// Extrae el valor de una cookie desde el header `Cookie`.
///
/// Los valores entre comillas se devuelven sin ellas.
pub fn get_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let pair = pair.trim_start();
        let eq = pair.find('=')?;
        if &pair[..eq] != name {
            return None;
        }
        let value = pair[eq + 1..].trim_end();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode_percent() {
        assert_eq!(url_decode("hello%20world", false), "hello world");
        assert_eq!(url_decode("%2Fetc%2fpasswd", false), "/etc/passwd");
    }

    #[test]
    fn test_url_decode_invalid_sequence_is_kept() {
        assert_eq!(url_decode("100%", false), "100%");
        assert_eq!(url_decode("%zz", false), "%zz");
        assert_eq!(url_decode("%4", false), "%4");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("a b.txt"), "a%20b.txt");
        assert_eq!(url_encode("x(1)~$"), "x(1)~$");
        assert_eq!(url_encode("ñ"), "%c3%b1");
    }

    #[test]
    fn test_remove_double_dots() {
        assert_eq!(remove_double_dots_and_double_slashes("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(remove_double_dots_and_double_slashes("/a//b///c"), "/a/b/c");
        assert_eq!(remove_double_dots_and_double_slashes("/.hidden"), "/.hidden");
        assert_eq!(remove_double_dots_and_double_slashes("/file.txt"), "/file.txt");
    }

    #[test]
    fn test_split_option_list_skips_empty_items() {
        let items: Vec<_> = split_option_list("a,,b").collect();
        assert_eq!(items, vec![("a", None), ("b", None)]);
        assert_eq!(split_option_list("").count(), 0);
    }

    #[test]
    fn test_get_var_form_decoding() {
        assert_eq!(get_var("q=a%26b+c", "q"), Some("a&b c".to_string()));
        assert_eq!(get_var("flag&q=1", "q"), Some("1".to_string()));
    }

    #[test]
    fn test_get_cookie() {
        let header = "session=abc123; theme=\"dark\"; empty=";
        assert_eq!(get_cookie(header, "session"), Some("abc123".to_string()));
        assert_eq!(get_cookie(header, "theme"), Some("dark".to_string()));
        assert_eq!(get_cookie(header, "empty"), Some(String::new()));
        assert_eq!(get_cookie(header, "missing"), None);
    }
}
