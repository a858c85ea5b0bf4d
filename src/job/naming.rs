// Job names: human-readable, deterministic file/display keys.
//
// Layout: `{list_name}__{key}_{value}__{key}_{value}...`
// Keys are sorted; extra tokens (e.g. `output_name`) come after the data tokens.

use serde_json::Value;

use super::data::{JobData, JobDataView, Scalar};
use crate::error::JobError;

/// Separator between the list name and each `key_value` token.
pub const TOKEN_SEPARATOR: &str = "__";

/// Separator between key and value inside a token.
pub const KEY_VALUE_SEPARATOR: char = '_';

/// Derive the job name for `data` under the batch list name `list_name`.
///
/// `extra` holds synthetic key/value pairs appended after the data tokens,
/// sorted by key.
///
/// Data that would make two distinct jobs share a name is rejected with
/// [`JobError::UnsupportedJobData`]: tokens containing `__` or starting or
/// ending with `_`, strings that read back as a bool or integer (`"7"`,
/// `"true"`), and scalar strings containing `_`.
pub fn job_name(
    list_name: &str,
    data: &JobData,
    extra: &[(&str, &str)],
) -> crate::error::Result<String> {
    let mut tokens: Vec<String> = Vec::new();
    match data.view()? {
        JobDataView::Scalar(scalar) => {
            if let Scalar::Str(s) = scalar {
                check_string_value(s)?;
                if s.contains(KEY_VALUE_SEPARATOR) {
                    return Err(JobError::unsupported_job_data(format!(
                        "scalar job '{s}' must not contain '{KEY_VALUE_SEPARATOR}'"
                    )));
                }
            }
            tokens.push(checked_token(scalar.to_string())?);
        }
        JobDataView::Map(entries) => {
            for (key, value) in entries {
                if let Scalar::Str(s) = value {
                    check_string_value(s)?;
                }
                tokens.push(checked_token(format!("{key}{KEY_VALUE_SEPARATOR}{value}"))?);
            }
        }
    }

    let mut extra: Vec<&(&str, &str)> = extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        tokens.push(checked_token(format!("{key}{KEY_VALUE_SEPARATOR}{value}"))?);
    }

    let mut name = String::from(list_name);
    for token in tokens {
        name.push_str(TOKEN_SEPARATOR);
        name.push_str(&token);
    }
    Ok(name)
}

/// A token must split back out of the joined name unchanged.
fn checked_token(token: String) -> crate::error::Result<String> {
    if token.contains(TOKEN_SEPARATOR)
        || token.starts_with(KEY_VALUE_SEPARATOR)
        || token.ends_with(KEY_VALUE_SEPARATOR)
    {
        return Err(JobError::unsupported_job_data(format!(
            "name token '{token}' must not contain '{TOKEN_SEPARATOR}' or start or end with '{KEY_VALUE_SEPARATOR}'"
        )));
    }
    Ok(token)
}

/// Strings spelled exactly like a bool or integer would share a name with it.
fn check_string_value(s: &str) -> crate::error::Result<()> {
    let ambiguous = match parse_name_token(s) {
        Value::Bool(_) => true,
        Value::Number(n) => n.to_string() == s,
        _ => false,
    };
    if ambiguous {
        return Err(JobError::unsupported_job_data(format!(
            "string value '{s}' is indistinguishable from a non-string in a job name; use a bool or integer, or override job_name"
        )));
    }
    Ok(())
}

/// Best-effort inverse of [`job_name`].
///
/// The `{list_name}__` prefix is stripped when present. A single token without
/// `_` is a scalar job. Otherwise each token is split on its *first*
/// underscore, so keys containing `_` do not survive the round trip.
pub fn parse_job_name(list_name: &str, name: &str) -> crate::error::Result<JobData> {
    if name == list_name {
        return Ok(JobData::from_value(Value::Object(serde_json::Map::new())));
    }
    let prefix = format!("{list_name}{TOKEN_SEPARATOR}");
    let body = name.strip_prefix(prefix.as_str()).unwrap_or(name);
    if body.is_empty() {
        return Err(JobError::job_name_parse(format!(
            "job name '{name}' has no tokens"
        )));
    }
    if !body.contains(KEY_VALUE_SEPARATOR) {
        return Ok(JobData::from_value(parse_name_token(body)));
    }

    let mut map = serde_json::Map::new();
    for token in body.split(TOKEN_SEPARATOR) {
        let (key, value) = token.split_once(KEY_VALUE_SEPARATOR).ok_or_else(|| {
            JobError::job_name_parse(format!(
                "token '{token}' in job name '{name}' is not of the form key_value"
            ))
        })?;
        map.insert(key.to_string(), parse_name_token(value));
    }
    Ok(JobData::from_value(Value::Object(map)))
}

/// Coerce a value token back to bool, else integer, else string.
pub fn parse_name_token(token: &str) -> Value {
    match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match token.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(token.to_string()),
        },
    }
}
