use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

const NODE_ID: &str = "NAIRA_NODE_ID";

const DEFAULT_NODE_ID: &str = "naira-node-001";

pub fn get_default_node_id() -> String {
    DEFAULT_NODE_ID.to_string()
}

pub fn get_node_id() -> Option<String> {
    non_empty_var(NODE_ID)
}

const SERIAL_PORT: &str = "NAIRA_SERIAL_PORT";

pub fn get_serial_port() -> Option<String> {
    non_empty_var(SERIAL_PORT)
}

const DB_PATH: &str = "NAIRA_DB_PATH";

pub fn get_db_path() -> Option<String> {
    non_empty_var(DB_PATH)
}

const INFLUX_URL: &str = "NAIRA_INFLUX_URL";
const INFLUX_TOKEN: &str = "NAIRA_INFLUX_TOKEN";
const INFLUX_ORG: &str = "NAIRA_INFLUX_ORG";
const INFLUX_BUCKET: &str = "NAIRA_INFLUX_BUCKET";
const INFLUX_ENABLED: &str = "NAIRA_INFLUX_ENABLED";

pub fn get_influx_url() -> Option<String> {
    non_empty_var(INFLUX_URL)
}

pub fn get_influx_token() -> Option<String> {
    non_empty_var(INFLUX_TOKEN)
}

pub fn get_influx_org() -> Option<String> {
    non_empty_var(INFLUX_ORG)
}

pub fn get_influx_bucket() -> Option<String> {
    non_empty_var(INFLUX_BUCKET)
}

pub fn get_influx_enabled() -> Option<bool> {
    std::env::var(INFLUX_ENABLED).ok().map(|v| parse_flag(&v))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True")
}

/// Canonical text form of an instant: microsecond precision, trailing `Z`.
///
/// Every stored timestamp uses this form so text comparison in SQL matches
/// chronological order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop sub-microsecond digits so an instant equals its stored form.
pub fn truncate_timestamp(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(6)
}

/// Parse an ISO-8601 instant with a `Z`, an explicit offset, or no suffix at
/// all (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
