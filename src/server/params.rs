use regex::Regex;
use std::sync::LazyLock;
use url::form_urlencoded;

pub const DEFAULT_LOCALE: &str = "en-US";

/// Parameters the relay derives from an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayParams {
    /// Market code controlling which regional image variant is returned.
    pub locale: String,

    /// Number of days before today for which to request the image (0 = today).
    pub index_past: u32,

    /// Whether to respond with the raw image bytes instead of the image URL.
    pub return_image: bool,
}

impl Default for RelayParams {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            index_past: 0,
            return_image: false,
        }
    }
}

impl RelayParams {
    /// Derive parameters from a request path and raw query string.
    ///
    /// Two mutually exclusive strategies, tried in order: a path matching the
    /// `get_image` pattern wins outright and any query parameters on such a
    /// request are ignored; otherwise the query string is consulted.
    pub fn from_request(path: &str, query: Option<&str>) -> Self {
        Self::from_image_path(path)
            .unwrap_or_else(|| Self::from_query(query.unwrap_or_default()))
    }

    /// Match the path shape `/get_image[_<locale>][_<index>].jpeg`.
    ///
    /// The pattern may appear anywhere in the path so that a shared-secret
    /// prefix does not prevent matching.
    fn from_image_path(path: &str) -> Option<Self> {
        // The locale group tolerates a bare `_` (as in `/get_image_.jpeg`),
        // which counts as an absent locale.
        static IMAGE_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"/get_image(?:_(?P<locale>[a-zA-Z-]+)?)?(?:_(?P<index>\d+))?\.jpeg")
                .expect("valid image path pattern")
        });

        let captures = IMAGE_PATH_PATTERN.captures(path)?;
        Some(Self {
            locale: captures
                .name("locale")
                .map(|m| m.as_str())
                .filter(|locale| !locale.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            // An index too large for u32 is treated like a non-numeric one
            // and falls back to today.
            index_past: captures
                .name("index")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0),
            return_image: true,
        })
    }

    /// Read the `locale`, `index_past` and `get_image` query parameters.
    /// An empty `locale` value keeps the default; a non-numeric or absent
    /// `index_past` falls back to 0.
    fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "locale" if !value.is_empty() => params.locale = value.into_owned(),
                "index_past" => params.index_past = value.parse().unwrap_or(0),
                "get_image" => params.return_image = true,
                _ => {}
            }
        }
        params
    }
}

/// Check whether `path` begins with `/<secret>`, ignoring ASCII case.
/// An empty secret disables the gate.
pub fn path_has_secret_prefix(path: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    rest.get(..secret.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(secret))
}
