//! # Matcher de Patrones
//! src/utils/pattern.rs
//!
//! Los patrones de configuración (`cgi_pattern`, `ssi_pattern`,
//! `hide_files_patterns`, `url_rewrite_patterns`...) usan una sintaxis glob
//! mínima que se evalúa como prefijo:
//!
//! | Símbolo | Significado                                 |
//! |---------|---------------------------------------------|
//! | `\|`    | Separa alternativas                          |
//! | `?`     | Cualquier carácter                           |
//! | `*`     | Cualquier secuencia que no contenga `/`      |
//! | `**`    | Cualquier secuencia                          |
//! | `$`     | Ancla el final del string                    |

/// Compara `pattern` contra el inicio de `s`.
///
/// Retorna la cantidad de bytes de `s` que consumió el match, o `None`
/// si no hay match. Un match de longitud cero cuenta como `Some(0)`; los
/// llamadores que necesitan un match real usan [`matches`].
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::match_prefix;
///
/// assert_eq!(match_prefix("/api", "/api/users"), Some(4));
/// assert_eq!(match_prefix("**.cgi$", "/bin/test.cgi"), Some(13));
/// assert_eq!(match_prefix("**.cgi$", "/bin/test.cgi.txt"), None);
/// ```
pub fn match_prefix(pattern: &str, s: &str) -> Option<usize> {
    match_bytes(pattern.as_bytes(), s.as_bytes())
}

/// `true` si el patrón hace match con al menos un byte de `s`
pub fn matches(pattern: &str, s: &str) -> bool {
    matches!(match_prefix(pattern, s), Some(n) if n > 0)
}

fn match_bytes(pattern: &[u8], s: &[u8]) -> Option<usize> {
    if let Some(bar) = pattern.iter().position(|&c| c == b'|') {
        match match_bytes(&pattern[..bar], s) {
            Some(n) if n > 0 => return Some(n),
            _ => return match_bytes(&pattern[bar + 1..], s),
        }
    }

    let mut i = 0;
    let mut j = 0;

    while i < pattern.len() {
        match pattern[i] {
            b'?' if j < s.len() => {
                i += 1;
                j += 1;
            }
            b'$' => {
                return if j == s.len() { Some(j) } else { None };
            }
            b'*' => {
                i += 1;
                let mut len = if i < pattern.len() && pattern[i] == b'*' {
                    i += 1;
                    s.len() - j
                } else {
                    s[j..].iter().position(|&c| c == b'/').unwrap_or(s.len() - j)
                };

                if i == pattern.len() {
                    return Some(j + len);
                }

                // Backtracking: probar desde el match más largo al más corto
                loop {
                    if let Some(res) = match_bytes(&pattern[i..], &s[j + len..]) {
                        return Some(j + len + res);
                    }
                    if len == 0 {
                        return None;
                    }
                    len -= 1;
                }
            }
            c => {
                if j >= s.len() || c != s[j] {
                    return None;
                }
                i += 1;
                j += 1;
            }
        }
    }

    Some(j)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_prefix() {
        assert_eq!(match_prefix("/api", "/api/users"), Some(4));
        assert_eq!(match_prefix("/api", "/ap"), None);
        assert_eq!(match_prefix("", "/anything"), Some(0));
    }

    #[test]
    fn test_question_mark() {
        assert_eq!(match_prefix("/a?c", "/abc"), Some(4));
        assert_eq!(match_prefix("/a?c", "/a"), None);
    }

    #[test]
    fn test_dollar_anchor() {
        assert_eq!(match_prefix("/index$", "/index"), Some(6));
        assert_eq!(match_prefix("/index$", "/index.html"), None);
    }

    #[test]
    fn test_single_star_stops_at_slash() {
        assert_eq!(match_prefix("/*.cgi$", "/test.cgi"), Some(9));
        assert_eq!(match_prefix("/*.cgi$", "/dir/test.cgi"), None);
        assert_eq!(match_prefix("/*", "/dir/file"), Some(4));
    }

    #[test]
    fn test_double_star_crosses_slashes() {
        assert_eq!(match_prefix("**.cgi$", "/a/b/c.cgi"), Some(10));
        assert_eq!(match_prefix("**", "/a/b"), Some(4));
    }

    #[test]
    fn test_alternatives() {
        let pattern = "**.cgi$|**.pl$|**.php$";
        assert!(matches(pattern, "/x.pl"));
        assert!(matches(pattern, "/x/y.php"));
        assert!(!matches(pattern, "/x.html"));
    }

    #[test]
    fn test_hidden_file_pattern() {
        assert!(matches("**.htpasswd$", "/www/secret/.htpasswd"));
        assert!(!matches("**.htpasswd$", "/www/secret/.htpasswd.bak"));
    }

    #[test]
    fn test_zero_length_match_is_not_a_match() {
        assert_eq!(match_prefix("**", ""), Some(0));
        assert!(!matches("**", ""));
    }
}
