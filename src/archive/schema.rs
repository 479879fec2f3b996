//! Structural HAR 1.2 checks
//!
//! Validation is advisory: every check returns `false` instead of failing.

use serde_json::{Map, Value};

type Object = Map<String, Value>;

/// Validate raw archive bytes
pub fn validate_bytes(raw: &[u8]) -> bool {
    serde_json::from_slice::<Value>(raw).is_ok_and(|value| validate_value(&value))
}

/// Validate a parsed archive document
pub fn validate_value(document: &Value) -> bool {
    let Some(log) = document.get("log").and_then(Value::as_object) else {
        return false;
    };

    has_str(log, "version")
        && log
            .get("creator")
            .and_then(Value::as_object)
            .is_some_and(|creator| has_str(creator, "name") && has_str(creator, "version"))
        && log
            .get("pages")
            .map_or(true, |pages| all_objects(pages, valid_page))
        && log
            .get("entries")
            .is_some_and(|entries| all_objects(entries, valid_entry))
}

fn valid_page(page: &Object) -> bool {
    is_date(page.get("startedDateTime"))
        && has_str(page, "id")
        && has_str(page, "title")
        && page.get("pageTimings").is_some_and(Value::is_object)
}

fn valid_entry(entry: &Object) -> bool {
    is_date(entry.get("startedDateTime"))
        && has_number(entry, "time")
        && entry
            .get("request")
            .and_then(Value::as_object)
            .is_some_and(valid_request)
        && entry
            .get("response")
            .and_then(Value::as_object)
            .is_some_and(valid_response)
        && entry.get("cache").is_some_and(Value::is_object)
        && entry
            .get("timings")
            .and_then(Value::as_object)
            .is_some_and(valid_timings)
}

fn valid_request(request: &Object) -> bool {
    has_str(request, "method")
        && has_str(request, "url")
        && has_str(request, "httpVersion")
        && is_pair_list(request.get("cookies"))
        && is_pair_list(request.get("headers"))
        && is_pair_list(request.get("queryString"))
        && has_number(request, "headersSize")
        && has_number(request, "bodySize")
        && request.get("postData").map_or(true, |post| {
            post.as_object()
                .is_some_and(|post| has_str(post, "mimeType"))
        })
}

fn valid_response(response: &Object) -> bool {
    has_number(response, "status")
        && has_str(response, "statusText")
        && has_str(response, "httpVersion")
        && is_pair_list(response.get("cookies"))
        && is_pair_list(response.get("headers"))
        && response
            .get("content")
            .and_then(Value::as_object)
            .is_some_and(|content| {
                has_number(content, "size")
                    && has_str(content, "mimeType")
                    && content.get("text").map_or(true, Value::is_string)
                    && content.get("encoding").map_or(true, Value::is_string)
            })
        && has_str(response, "redirectURL")
        && has_number(response, "headersSize")
        && has_number(response, "bodySize")
}

fn valid_timings(timings: &Object) -> bool {
    ["send", "wait", "receive"]
        .iter()
        .all(|name| has_number(timings, name))
        && ["blocked", "dns", "connect", "ssl"]
            .iter()
            .all(|name| timings.get(*name).map_or(true, Value::is_number))
}

fn has_str(object: &Object, name: &str) -> bool {
    object.get(name).is_some_and(Value::is_string)
}

fn has_number(object: &Object, name: &str) -> bool {
    object.get(name).is_some_and(Value::is_number)
}

fn is_date(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
}

fn all_objects(list: &Value, check: fn(&Object) -> bool) -> bool {
    list.as_array().is_some_and(|items| {
        items
            .iter()
            .all(|item| item.as_object().is_some_and(check))
    })
}

fn is_pair_list(value: Option<&Value>) -> bool {
    value.is_some_and(|list| {
        all_objects(list, |pair| has_str(pair, "name") && has_str(pair, "value"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_entry() -> Value {
        json!({
            "startedDateTime": "2024-01-01T00:00:00.000Z",
            "time": 1.5,
            "request": {
                "method": "GET",
                "url": "https://example.com/",
                "httpVersion": "HTTP/1.1",
                "cookies": [],
                "headers": [{"name": "accept", "value": "*/*"}],
                "queryString": [],
                "headersSize": -1,
                "bodySize": -1
            },
            "response": {
                "status": 200,
                "statusText": "OK",
                "httpVersion": "HTTP/1.1",
                "cookies": [],
                "headers": [],
                "content": {"size": 0, "mimeType": "text/plain", "text": ""},
                "redirectURL": "",
                "headersSize": -1,
                "bodySize": -1
            },
            "cache": {},
            "timings": {"send": 0, "wait": 0, "receive": 0}
        })
    }

    fn document(entries: Value) -> Value {
        json!({
            "log": {
                "version": "1.2",
                "creator": {"name": "vcrproxy", "version": "0.1.0"},
                "entries": entries
            }
        })
    }

    #[test]
    fn test_valid_document() {
        assert!(validate_value(&document(json!([minimal_entry()]))));
        assert!(validate_value(&document(json!([]))));
    }

    #[test]
    fn test_non_object_entry_is_invalid() {
        assert!(!validate_value(&document(json!(["blob"]))));
    }

    #[test]
    fn test_missing_log_is_invalid() {
        assert!(!validate_value(&json!({})));
        assert!(!validate_bytes(b"not json"));
    }

    #[test]
    fn test_bad_header_pair_is_invalid() {
        let mut entry = minimal_entry();
        entry["request"]["headers"] = json!([{"name": "x", "value": 1}]);
        assert!(!validate_value(&document(json!([entry]))));
    }

    #[test]
    fn test_bad_date_is_invalid() {
        let mut entry = minimal_entry();
        entry["startedDateTime"] = json!("yesterday");
        assert!(!validate_value(&document(json!([entry]))));
    }
}
