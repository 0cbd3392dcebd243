/// Bucket for updates whose path carries no recognizable interface token.
pub const UNKNOWN_INTERFACE: &str = "unknown";

/// A telemetry path split into the interface it addresses and the field
/// path below it.
///
/// Update paths look like `interface[name=ethernet-1/1]/statistics/in-octets`,
/// possibly with a module prefix before the interface token. Anything that
/// does not contain an `interface[name=...]` token lands in the
/// [`UNKNOWN_INTERFACE`] bucket with an empty field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePath {
    pub interface: String,
    pub field_path: Vec<String>,
}

impl UpdatePath {
    pub fn parse(path: &str) -> Self {
        const TOKEN: &str = "interface[name=";

        let Some(start) = path.find(TOKEN) else {
            return Self::unknown();
        };
        let rest = &path[start + TOKEN.len()..];
        let Some(end) = rest.find(']') else {
            return Self::unknown();
        };

        let interface = rest[..end].to_string();
        let field_path = rest[end + 1..]
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            interface,
            field_path,
        }
    }

    fn unknown() -> Self {
        Self {
            interface: UNKNOWN_INTERFACE.to_string(),
            field_path: Vec::new(),
        }
    }

    /// True when the path addresses a field below the interface root.
    pub fn has_fields(&self) -> bool {
        !self.field_path.is_empty()
    }
}
