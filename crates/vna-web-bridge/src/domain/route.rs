//! The connection gate's routing decision.
//!
//! Every inbound connection starts with an HTTP request head.  The gate
//! looks at two things only: whether the request asks for a protocol
//! upgrade, and its path.
//!
//! | Upgrade? | Last path segment     | Route              |
//! |----------|-----------------------|--------------------|
//! | yes      | `nanovna-control`     | [`Route::Control`] |
//! | yes      | anything else         | [`Route::Rejected`]|
//! | no       | (any)                 | [`Route::Static`]  |

/// Where a connection goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Hand the connection to a Bridge Session.
    Control,
    /// Serve a file; `path` is the request path with `/` mapped to
    /// `/index.html` and the query string removed.
    Static { path: String },
    /// An upgrade to a path we do not serve: answer 404.
    Rejected,
}

/// Classifies a request by its target and whether it carried `Upgrade`.
///
/// # Example
///
/// ```rust
/// use vna_web_bridge::domain::{classify, Route};
///
/// assert_eq!(classify("/foo/nanovna-control", true, "nanovna-control"), Route::Control);
/// assert_eq!(classify("/foo/other", true, "nanovna-control"), Route::Rejected);
/// ```
pub fn classify(target: &str, is_upgrade: bool, control_token: &str) -> Route {
    let path = request_path(target);

    if is_upgrade {
        return if last_segment(path) == control_token {
            Route::Control
        } else {
            Route::Rejected
        };
    }

    let path = if path == "/" { "/index.html" } else { path };
    Route::Static {
        path: path.to_string(),
    }
}

/// Strips the query string and fragment from a request target.
pub fn request_path(target: &str) -> &str {
    target.split(['?', '#']).next().unwrap_or(target)
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "nanovna-control";

    #[test]
    fn test_upgrade_to_control_path_is_control() {
        assert_eq!(classify("/foo/nanovna-control", true, TOKEN), Route::Control);
    }

    #[test]
    fn test_upgrade_to_root_control_path_is_control() {
        assert_eq!(classify("/nanovna-control", true, TOKEN), Route::Control);
    }

    #[test]
    fn test_upgrade_to_other_path_is_rejected() {
        assert_eq!(classify("/foo/other", true, TOKEN), Route::Rejected);
    }

    #[test]
    fn test_upgrade_with_token_as_directory_is_rejected() {
        // Only the final segment counts.
        assert_eq!(classify("/nanovna-control/x", true, TOKEN), Route::Rejected);
    }

    #[test]
    fn test_upgrade_with_trailing_slash_is_rejected() {
        assert_eq!(classify("/nanovna-control/", true, TOKEN), Route::Rejected);
    }

    #[test]
    fn test_upgrade_query_string_is_ignored() {
        assert_eq!(
            classify("/app/nanovna-control?v=2", true, TOKEN),
            Route::Control
        );
    }

    #[test]
    fn test_plain_get_of_control_path_is_static() {
        // Without Upgrade the path is just a (probably missing) file.
        assert_eq!(
            classify("/nanovna-control", false, TOKEN),
            Route::Static {
                path: "/nanovna-control".to_string()
            }
        );
    }

    #[test]
    fn test_root_maps_to_index_html() {
        assert_eq!(
            classify("/", false, TOKEN),
            Route::Static {
                path: "/index.html".to_string()
            }
        );
    }

    #[test]
    fn test_root_with_query_maps_to_index_html() {
        assert_eq!(
            classify("/?lang=en", false, TOKEN),
            Route::Static {
                path: "/index.html".to_string()
            }
        );
    }

    #[test]
    fn test_custom_token() {
        assert_eq!(classify("/ws/vna", true, "vna"), Route::Control);
        assert_eq!(classify("/ws/nanovna-control", true, "vna"), Route::Rejected);
    }

    #[test]
    fn test_request_path_strips_fragment() {
        assert_eq!(request_path("/a.html#top"), "/a.html");
    }
}
