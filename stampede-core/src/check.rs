use stampede_http::HttpResponse;

/// A single assertion evaluated against a completed response. Checks record
/// into the `checks` rate metric but never abort the iteration; a scenario
/// decides what to do with a failed batch.
#[derive(Debug, Clone, Copy)]
pub struct Check {
    pub name: &'static str,
    pub kind: CheckKind,
}

#[derive(Debug, Clone, Copy)]
pub enum CheckKind {
    /// Status equals the expected code.
    StatusIs(u16),
    /// Body parses as JSON and the top-level object has this field.
    JsonFieldExists(&'static str),
    /// Body parses as JSON and the top-level field equals this string.
    JsonFieldEquals(&'static str, &'static str),
    /// Body contains this substring.
    BodyContains(&'static str),
    /// Arbitrary predicate over the response.
    Predicate(fn(&HttpResponse) -> bool),
}

impl Check {
    #[must_use]
    pub const fn new(name: &'static str, kind: CheckKind) -> Self {
        Self { name, kind }
    }

    #[must_use]
    pub const fn status_is(name: &'static str, status: u16) -> Self {
        Self::new(name, CheckKind::StatusIs(status))
    }

    #[must_use]
    pub const fn json_field_exists(name: &'static str, field: &'static str) -> Self {
        Self::new(name, CheckKind::JsonFieldExists(field))
    }

    pub fn evaluate(&self, response: &HttpResponse) -> CheckOutcome {
        let passed = match self.kind {
            CheckKind::StatusIs(expected) => response.status == expected,
            CheckKind::JsonFieldExists(field) => json_field(response, field).is_some(),
            CheckKind::JsonFieldEquals(field, expected) => {
                json_field(response, field).is_some_and(|v| v.as_str() == Some(expected))
            }
            CheckKind::BodyContains(needle) => {
                response.body_utf8().is_some_and(|body| body.contains(needle))
            }
            CheckKind::Predicate(f) => f(response),
        };
        CheckOutcome {
            name: self.name,
            passed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
}

fn json_field(response: &HttpResponse, field: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_slice(&response.body).ok()?;
    value.get(field).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    #[test]
    fn status_check() {
        let check = Check::status_is("status is 200", 200);
        assert!(check.evaluate(&response(200, "")).passed);
        assert!(!check.evaluate(&response(500, "")).passed);
    }

    #[test]
    fn json_field_exists_check() {
        let check = Check::json_field_exists("has token", "token");
        assert!(check.evaluate(&response(200, r#"{"token":"abc"}"#)).passed);
        assert!(!check.evaluate(&response(200, r#"{"other":1}"#)).passed);
        assert!(!check.evaluate(&response(200, "not json")).passed);
    }

    #[test]
    fn json_field_equals_check() {
        let check = Check::new("ok status", CheckKind::JsonFieldEquals("status", "ok"));
        assert!(check.evaluate(&response(200, r#"{"status":"ok"}"#)).passed);
        assert!(!check.evaluate(&response(200, r#"{"status":"down"}"#)).passed);
    }

    #[test]
    fn body_contains_check() {
        let check = Check::new("mentions cart", CheckKind::BodyContains("cart"));
        assert!(check.evaluate(&response(200, r#"{"cart":[]}"#)).passed);
        assert!(!check.evaluate(&response(200, "{}")).passed);
    }

    #[test]
    fn predicate_check() {
        let check = Check::new(
            "non-empty body",
            CheckKind::Predicate(|r| !r.body.is_empty()),
        );
        assert!(check.evaluate(&response(200, "x")).passed);
        assert!(!check.evaluate(&response(200, "")).passed);
    }
}
