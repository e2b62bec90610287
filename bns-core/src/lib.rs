use {
    std::fmt,
    serde_json::Value,
};

pub const DEFAULT_VAR_NAME: &str = "SS_BUILD_NUMBER";

/// Output encoding selector for a build number.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Style {
    #[default]
    Bash,
    Json,
    Yaml,
}

impl Style {
    pub const RESERVED: [Style; 3] = [Style::Bash, Style::Json, Style::Yaml];

    /// Matches a path segment that is exactly one of the style tokens. Case-sensitive.
    pub fn reserved(token: &str) -> Option<Self> {
        Self::RESERVED.into_iter().find(|style| style.as_str() == token)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a build number as a single line (without the trailing newline).
pub fn format_build_number(value: i64, style: Style, var_name: &str) -> String {
    match style {
        Style::Bash => format!("{var_name}={value}"),
        Style::Yaml => format!("{var_name}: {value}"),
        // variable name goes through a json string encoder, so quotes and backslashes stay valid
        Style::Json => format!("{{{}: {value}}}", Value::String(var_name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_style() {
        assert_eq!("SS_BUILD_NUMBER=42", format_build_number(42, Style::Bash, DEFAULT_VAR_NAME));
        assert_eq!("{\"SS_BUILD_NUMBER\": 42}", format_build_number(42, Style::Json, DEFAULT_VAR_NAME));
        assert_eq!("SS_BUILD_NUMBER: 42", format_build_number(42, Style::Yaml, DEFAULT_VAR_NAME));
    }

    #[test]
    fn uses_configured_var_name() {
        assert_eq!("BUILD=0", format_build_number(0, Style::Bash, "BUILD"));
        assert_eq!("{\"BUILD\": 7}", format_build_number(7, Style::Json, "BUILD"));
    }

    #[test]
    fn json_escapes_var_name() {
        assert_eq!("{\"a\\\"b\": 1}", format_build_number(1, Style::Json, "a\"b"));
    }

    #[test]
    fn unknown_tokens_fall_back_to_bash() {
        for token in ["", "xml", "JSON", "Yaml", "inc", "bash "] {
            assert_eq!(None, Style::reserved(token), "token: {token:?}");
        }
        assert_eq!("X=3", format_build_number(3, Style::reserved("toml").unwrap_or_default(), "X"));
    }

    #[test]
    fn reserved_tokens_are_exact() {
        assert_eq!(Some(Style::Bash), Style::reserved("bash"));
        assert_eq!(Some(Style::Json), Style::reserved("json"));
        assert_eq!(Some(Style::Yaml), Style::reserved("yaml"));
        assert_eq!(None, Style::reserved("Bash"));
        assert_eq!(None, Style::reserved("inc"));
    }

    #[test]
    fn style_tokens_round_trip() {
        for style in Style::RESERVED {
            assert_eq!(Some(style), Style::reserved(style.as_str()));
            assert_eq!(style.as_str(), style.to_string());
        }
    }
}
