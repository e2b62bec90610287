use {
    hyper::Method,
    thiserror::Error,
    bns_core::Style,
};

const SEGMENT_INCREMENT: &str = "inc";

/// Store operation selected by an incoming request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Route {
    Get {
        project: String,
        style: Style,
    },
    Increment {
        project: String,
        style: Style,
    },
    Set {
        project: String,
        build_number: i64,
    },
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum RouteError {
    #[error("method not supported: {method}")]
    MethodNotSupported { method: String },

    #[error("project name is empty")]
    EmptyProjectName,

    #[error("project name is not valid utf-8 after percent-decoding")]
    ProjectNameEncoding,

    #[error("build number is missing")]
    MissingBuildNumber,

    #[error("build number must be a non-negative integer, got: {value:?}")]
    InvalidBuildNumber { value: String },
}

impl Route {
    /// Maps method and path (without query string) to a store operation.
    ///
    /// Project names may contain slashes, so reserved suffixes are matched from the end of the
    /// path, most specific first:
    ///
    /// 1. `GET /{project}/inc/{style}`
    /// 2. `GET /{project}/inc`
    /// 3. `GET /{project}/{style}`
    /// 4. `GET /{project}`
    /// 5. `POST /{project}/{build}`
    ///
    /// A suffix is only recognized when a non-empty project name remains in front of it, and
    /// the project name is percent-decoded after matching, so `/foo%2Finc` reads project
    /// `foo/inc` while `/foo/inc` increments project `foo`.
    pub fn resolve(method: &Method, path: &str) -> Result<Self, RouteError> {
        let path = path.strip_prefix('/').unwrap_or(path);

        match *method {
            Method::GET => Self::resolve_get(path),
            Method::POST => Self::resolve_post(path),
            _ => Err(RouteError::MethodNotSupported { method: method.to_string() }),
        }
    }

    fn resolve_get(path: &str) -> Result<Self, RouteError> {
        if let Some((rest, style)) = strip_style(path) {
            if let Some(project) = strip_segment(rest, SEGMENT_INCREMENT) {
                return Ok(Self::Increment { project: decode_project_name(project)?, style });
            }
        }

        if let Some(project) = strip_segment(path, SEGMENT_INCREMENT) {
            return Ok(Self::Increment { project: decode_project_name(project)?, style: Style::default() });
        }

        if let Some((project, style)) = strip_style(path) {
            return Ok(Self::Get { project: decode_project_name(project)?, style });
        }

        Ok(Self::Get { project: decode_project_name(path)?, style: Style::default() })
    }

    fn resolve_post(path: &str) -> Result<Self, RouteError> {
        let (project, build_number) = split_last_segment(path).ok_or(RouteError::MissingBuildNumber)?;

        Ok(Self::Set {
            project: decode_project_name(project)?,
            build_number: parse_build_number(build_number)?,
        })
    }
}

/// Splits `{project}/{segment}`. Returns `None` when there is no separator or nothing before it.
fn split_last_segment(path: &str) -> Option<(&str, &str)> {
    let (project, segment) = path.rsplit_once('/')?;
    if project.is_empty() {
        None
    } else {
        Some((project, segment))
    }
}

fn strip_segment<'a>(path: &'a str, segment: &str) -> Option<&'a str> {
    split_last_segment(path)
        .filter(|(_, last)| *last == segment)
        .map(|(project, _)| project)
}

fn strip_style(path: &str) -> Option<(&str, Style)> {
    let (project, last) = split_last_segment(path)?;
    Style::reserved(last).map(|style| (project, style))
}

fn decode_project_name(raw: &str) -> Result<String, RouteError> {
    let project = urlencoding::decode(raw)
        .map_err(|_| RouteError::ProjectNameEncoding)?
        .into_owned();

    if project.is_empty() {
        return Err(RouteError::EmptyProjectName);
    }

    Ok(project)
}

fn parse_build_number(raw: &str) -> Result<i64, RouteError> {
    let invalid = || RouteError::InvalidBuildNumber { value: raw.to_owned() };

    // str::parse would also accept a leading '+'
    if raw.is_empty() || !raw.bytes().all(|v| v.is_ascii_digit()) {
        return Err(invalid());
    }

    raw.parse::<i64>().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> Result<Route, RouteError> {
        Route::resolve(&Method::GET, path)
    }

    fn post(path: &str) -> Result<Route, RouteError> {
        Route::resolve(&Method::POST, path)
    }

    fn read(project: &str, style: Style) -> Route {
        Route::Get { project: project.to_owned(), style }
    }

    fn increment(project: &str, style: Style) -> Route {
        Route::Increment { project: project.to_owned(), style }
    }

    #[test]
    fn get_plain_project() {
        assert_eq!(Ok(read("acme", Style::Bash)), get("/acme"));
    }

    #[test]
    fn get_with_style() {
        assert_eq!(Ok(read("acme", Style::Json)), get("/acme/json"));
        assert_eq!(Ok(read("acme", Style::Yaml)), get("/acme/yaml"));
        assert_eq!(Ok(read("acme", Style::Bash)), get("/acme/bash"));
    }

    #[test]
    fn increment_default_and_styled() {
        assert_eq!(Ok(increment("acme", Style::Bash)), get("/acme/inc"));
        assert_eq!(Ok(increment("acme", Style::Json)), get("/acme/inc/json"));
        assert_eq!(Ok(increment("acme", Style::Yaml)), get("/acme/inc/yaml"));
        assert_eq!(Ok(increment("acme", Style::Bash)), get("/acme/inc/bash"));
    }

    #[test]
    fn project_names_with_slashes() {
        assert_eq!(Ok(read("group/acme", Style::Bash)), get("/group/acme"));
        assert_eq!(Ok(read("group/acme", Style::Yaml)), get("/group/acme/yaml"));
        assert_eq!(Ok(increment("group/acme", Style::Bash)), get("/group/acme/inc"));
        assert_eq!(Ok(increment("group/acme", Style::Json)), get("/group/acme/inc/json"));
    }

    #[test]
    fn reserved_suffix_wins_over_project_name() {
        // never read as project "foo/inc"
        assert_eq!(Ok(increment("foo", Style::Bash)), get("/foo/inc"));
        assert_eq!(Ok(increment("foo/inc", Style::Bash)), get("/foo/inc/inc"));
        assert_eq!(Ok(increment("foo/json", Style::Bash)), get("/foo/json/inc"));
        assert_eq!(Ok(read("foo/json", Style::Json)), get("/foo/json/json"));
    }

    #[test]
    fn encoded_slash_addresses_literal_project() {
        assert_eq!(Ok(read("foo/inc", Style::Bash)), get("/foo%2Finc"));
        assert_eq!(Ok(increment("foo/inc", Style::Json)), get("/foo%2Finc/inc/json"));
        assert_eq!(Ok(read("my project", Style::Bash)), get("/my%20project"));
    }

    #[test]
    fn suffix_needs_a_project_in_front() {
        assert_eq!(Ok(read("inc", Style::Bash)), get("/inc"));
        assert_eq!(Ok(read("json", Style::Bash)), get("/json"));
        assert_eq!(Ok(read("inc", Style::Json)), get("/inc/json"));
    }

    #[test]
    fn unknown_trailing_segment_is_part_of_project() {
        assert_eq!(Ok(read("acme/xml", Style::Bash)), get("/acme/xml"));
        assert_eq!(Ok(read("acme/JSON", Style::Bash)), get("/acme/JSON"));
        assert_eq!(Ok(read("acme/inc/xml", Style::Bash)), get("/acme/inc/xml"));
    }

    #[test]
    fn empty_project_is_rejected() {
        assert_eq!(Err(RouteError::EmptyProjectName), get("/"));
        assert_eq!(Err(RouteError::EmptyProjectName), get(""));
    }

    #[test]
    fn invalid_percent_encoding_is_rejected() {
        assert_eq!(Err(RouteError::ProjectNameEncoding), get("/%ff%fe"));
    }

    #[test]
    fn post_sets_build_number() {
        assert_eq!(Ok(Route::Set { project: "acme".to_owned(), build_number: 42 }), post("/acme/42"));
        assert_eq!(Ok(Route::Set { project: "group/acme".to_owned(), build_number: 0 }), post("/group/acme/0"));
        assert_eq!(Ok(Route::Set { project: "acme".to_owned(), build_number: 7 }), post("/acme/007"));
    }

    #[test]
    fn post_rejects_malformed_build_numbers() {
        for value in ["abc", "-1", "+1", "1.5", "", " 1", "99999999999999999999"] {
            assert_eq!(
                Err(RouteError::InvalidBuildNumber { value: value.to_owned() }),
                post(&format!("/acme/{value}")),
                "value: {value:?}",
            );
        }
    }

    #[test]
    fn post_without_build_number() {
        assert_eq!(Err(RouteError::MissingBuildNumber), post("/acme"));
        assert_eq!(Err(RouteError::MissingBuildNumber), post("/"));
    }

    #[test]
    fn other_methods_are_rejected() {
        assert_eq!(
            Err(RouteError::MethodNotSupported { method: "DELETE".to_owned() }),
            Route::resolve(&Method::DELETE, "/acme"),
        );
    }
}
