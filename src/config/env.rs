use std::collections::{BTreeMap, HashMap};

use super::{Config, Error, LabelConfig, Result, TokenByMatch};

pub const SECURE: &str = "SHIPPER_SECURE";
pub const SERVER: &str = "SHIPPER_SERVER";
pub const PORT: &str = "SHIPPER_PORT";
pub const TOKEN: &str = "SHIPPER_TOKEN";
pub const LOGS_TOKEN: &str = "SHIPPER_LOGS_TOKEN";
pub const STATS_TOKEN: &str = "SHIPPER_STATS_TOKEN";
pub const EVENTS_TOKEN: &str = "SHIPPER_EVENTS_TOKEN";
pub const TOKEN_BY_MATCH: &str = "SHIPPER_TOKEN_BY_MATCH";
pub const LABEL_PATTERN: &str = "SHIPPER_LABEL_PATTERN";
pub const LABEL_TEMPLATE: &str = "SHIPPER_LABEL_TEMPLATE";
pub const NO_LOGS: &str = "SHIPPER_NO_LOGS";
pub const NO_STATS: &str = "SHIPPER_NO_STATS";
pub const NO_EVENTS: &str = "SHIPPER_NO_EVENTS";
pub const ADD: &str = "SHIPPER_ADD";

/// Builds a [`Config`] from `SHIPPER_*` variables.
pub(super) fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Config> {
    let vars: HashMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| key.starts_with("SHIPPER_"))
        .collect();
    let get = |key: &str| vars.get(key).map(String::as_str);

    let server = get(SERVER)
        .filter(|server| !server.is_empty())
        .ok_or(Error::MissingVariable(SERVER))?
        .to_owned();
    let port = get(PORT)
        .map(|raw| {
            raw.parse::<u16>().map_err(|_| Error::InvalidValue {
                key: PORT,
                value: raw.to_owned(),
            })
        })
        .transpose()?;

    let label = match (get(LABEL_PATTERN), get(LABEL_TEMPLATE)) {
        (Some(pattern), Some(template)) => Some(LabelConfig {
            pattern: pattern.to_owned(),
            template: template.to_owned(),
        }),
        (Some(_), None) => {
            return Err(Error::IncompleteLabel {
                present: LABEL_PATTERN,
                missing: LABEL_TEMPLATE,
            });
        }
        (None, Some(_)) => {
            return Err(Error::IncompleteLabel {
                present: LABEL_TEMPLATE,
                missing: LABEL_PATTERN,
            });
        }
        (None, None) => None,
    };

    Ok(Config {
        secure: flag(SECURE, get(SECURE))?,
        server,
        port,
        token: get(TOKEN).map(str::to_owned),
        logs_token: get(LOGS_TOKEN).map(str::to_owned),
        stats_token: get(STATS_TOKEN).map(str::to_owned),
        events_token: get(EVENTS_TOKEN).map(str::to_owned),
        token_by_match: get(TOKEN_BY_MATCH)
            .map(parse_token_by_match)
            .transpose()?
            .unwrap_or_default(),
        label,
        logs: !flag(NO_LOGS, get(NO_LOGS))?,
        stats: !flag(NO_STATS, get(NO_STATS))?,
        events: !flag(NO_EVENTS, get(NO_EVENTS))?,
        add: get(ADD).map(parse_add).transpose()?.unwrap_or_default(),
    })
}

fn flag(key: &'static str, value: Option<&str>) -> Result<bool> {
    match value.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => {
            Ok(true)
        }
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => {
            Ok(false)
        }
        Some(v) => Err(Error::InvalidValue {
            key,
            value: v.to_owned(),
        }),
    }
}

// Split on the last `=` so patterns may contain one.
fn parse_token_by_match(raw: &str) -> Result<Vec<TokenByMatch>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .rsplit_once('=')
                .filter(|(pattern, _)| !pattern.is_empty())
                .map(|(pattern, token)| TokenByMatch {
                    pattern: pattern.to_owned(),
                    token: token.trim().to_owned(),
                })
                .ok_or_else(|| Error::InvalidEntry {
                    key: TOKEN_BY_MATCH,
                    entry: entry.to_owned(),
                    expected: "pattern=token",
                })
        })
        .collect()
}

fn parse_add(raw: &str) -> Result<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
                .ok_or_else(|| Error::InvalidEntry {
                    key: ADD,
                    entry: entry.to_owned(),
                    expected: "key=value",
                })
        })
        .collect()
}
