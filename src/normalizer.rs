//! Normalizer (spec.md §4.B).
//!
//! Turns a free-form JSON mapping into the canonical shape by attempting a
//! Fortinet-style `key=value` parse of its `message` field. Anything that
//! isn't a mapping, or is a mapping without a string `message`, passes
//! through unchanged (spec.md §4.B "Passthrough rule").

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;

use crate::event::{
    DEFAULT_DATASET, DEFAULT_SCHEMA_VERSION, DEFAULT_TENANT_ID, Event, FIELD_DATASET,
    FIELD_SCHEMA_VERSION, FIELD_SEVERITY, FIELD_SEVERITY_ORIGINAL, FIELD_TENANT_ID,
    FIELD_TIMESTAMP,
};

static PRI_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^<\d+>\s*").unwrap());
static PPS_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpps\s+(\d+)\b").unwrap());

/// Normalizes a raw JSON value per spec.md §4.B.
///
/// Non-mapping inputs, and mappings without a string `message`, are
/// returned unchanged (wrapped back into a `Value`) — the passthrough
/// rule. Everything else becomes a fully-populated `Event`.
pub fn normalize(raw: Value) -> Value {
    let Value::Object(map) = raw else {
        return raw;
    };
    let Some(message) = map.get("message").and_then(Value::as_str).map(str::to_string) else {
        return Value::Object(map);
    };

    let mut event = Event::new(map);
    let raw_message = message.clone();
    let stripped = PRI_PREFIX.replace(&message, "").into_owned();
    let kv = parse_kv(&stripped);

    apply_timestamp(&mut event, &kv);
    apply_known_fields(&mut event, &kv);
    scan_packets_per_second(&mut event, &stripped);

    event.set_path(&["original", "message_raw"], Value::String(raw_message));
    event.set_path(
        &["original", "raw_kv"],
        Value::Object(
            kv.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
    );

    let severity_original = kv
        .get("severity")
        .cloned()
        .or_else(|| event.get_str(FIELD_SEVERITY).map(str::to_string));
    if let Some(raw_severity) = severity_original {
        event.set(FIELD_SEVERITY_ORIGINAL, Value::String(raw_severity.clone()));
        event.set(FIELD_SEVERITY, Value::String(raw_severity.to_lowercase()));
    }

    if event.tenant_id().is_none() {
        event.set_tenant_id(DEFAULT_TENANT_ID);
    }
    if event.get_str(FIELD_DATASET).is_none() {
        event.set(FIELD_DATASET, Value::String(DEFAULT_DATASET.to_string()));
    }
    if event.get_str(FIELD_SCHEMA_VERSION).is_none() {
        event.set(
            FIELD_SCHEMA_VERSION,
            Value::String(DEFAULT_SCHEMA_VERSION.to_string()),
        );
    }

    event.into_value()
}

/// Tokenizes `key=value` pairs, honoring quoted values that may contain
/// spaces (e.g. `msg="anomaly detected"`). Malformed tokens (`badkey=`
/// with no key, or a bare word with no `=`) are skipped rather than
/// crashing or producing a half pair.
fn parse_kv(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let len = bytes.len();

    while i < len {
        while i < len && bytes[i] == b' ' {
            i += 1;
        }
        let key_start = i;
        while i < len && bytes[i] != b'=' && bytes[i] != b' ' {
            i += 1;
        }
        if i >= len || bytes[i] != b'=' {
            // No '=' before the next space/end: not a kv token, skip the word.
            continue;
        }
        let key = input[key_start..i].to_string();
        i += 1; // skip '='

        let value;
        if i < len && bytes[i] == b'"' {
            i += 1;
            let value_start = i;
            while i < len && bytes[i] != b'"' {
                i += 1;
            }
            value = input[value_start..i].to_string();
            if i < len {
                i += 1; // skip closing quote
            }
        } else {
            let value_start = i;
            while i < len && bytes[i] != b' ' {
                i += 1;
            }
            value = input[value_start..i].to_string();
        }

        if !key.is_empty() {
            pairs.push((key, value));
        }
    }
    pairs
}

fn kv_get<'a>(kv: &'a [(String, String)], key: &str) -> Option<&'a str> {
    kv.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Trait object-free lookup helper so callers can treat `Vec<(String,
/// String)>` like a map without paying for a `HashMap` on short vendor
/// payloads (typically under twenty pairs).
trait KvLookup {
    fn get(&self, key: &str) -> Option<&str>;
}

impl KvLookup for Vec<(String, String)> {
    fn get(&self, key: &str) -> Option<&str> {
        kv_get(self, key)
    }
}

fn apply_timestamp(event: &mut Event, kv: &Vec<(String, String)>) {
    if let Some(eventtime) = KvLookup::get(kv, "eventtime") {
        if let Some(ts) = parse_eventtime_ns(eventtime) {
            event.set(FIELD_TIMESTAMP, Value::String(ts));
            return;
        }
    }
    if let (Some(date), Some(time)) = (KvLookup::get(kv, "date"), KvLookup::get(kv, "time")) {
        let tz = KvLookup::get(kv, "tz").unwrap_or("+0000");
        if let Some(ts) = compose_timestamp(date, time, tz) {
            event.set(FIELD_TIMESTAMP, Value::String(ts));
            return;
        }
    }
    if event.timestamp().is_none() {
        if let Some(existing) = event
            .get_str(FIELD_TIMESTAMP)
            .or_else(|| event.get_str("timestamp"))
            .map(str::to_string)
        {
            event.set(FIELD_TIMESTAMP, Value::String(existing));
            return;
        }
        event.set(FIELD_TIMESTAMP, Value::String(Utc::now().to_rfc3339()));
    }
}

fn parse_eventtime_ns(raw: &str) -> Option<String> {
    let nanos: i64 = raw.parse().ok()?;
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec_nanos = nanos.rem_euclid(1_000_000_000) as u32;
    let dt = DateTime::from_timestamp(secs, subsec_nanos)?;
    // Microsecond precision to match the original's `datetime.isoformat()`
    // (spec.md §8 scenario 1 expects `...19.127000+00:00`, not the
    // 3-digit millisecond form `to_rfc3339()` would render here).
    Some(dt.to_rfc3339_opts(SecondsFormat::Micros, false))
}

fn compose_timestamp(date: &str, time: &str, tz: &str) -> Option<String> {
    let tz = tz.trim_matches('"');
    let naive = NaiveDateTime::parse_from_str(
        &format!("{date} {time}"),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()?;
    let offset = parse_tz_offset(tz)?;
    let dt = naive.and_local_timezone(offset).single()?;
    Some(dt.with_timezone(&Utc).to_rfc3339())
}

fn parse_tz_offset(tz: &str) -> Option<chrono::FixedOffset> {
    if tz.len() != 5 {
        return None;
    }
    let sign = match &tz[0..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i32 = tz[1..3].parse().ok()?;
    let minutes: i32 = tz[3..5].parse().ok()?;
    let total_seconds = sign * (hours * 3600 + minutes * 60);
    chrono::FixedOffset::east_opt(total_seconds)
}

fn apply_known_fields(event: &mut Event, kv: &Vec<(String, String)>) {
    if let Some(host) = KvLookup::get(kv, "devname").or_else(|| KvLookup::get(kv, "devid")) {
        event.set("host", Value::String(host.to_string()));
    }
    if let Some(msg) = KvLookup::get(kv, "msg") {
        event.set("message", Value::String(msg.to_string()));
    }

    set_ip(event, kv, "srcip", &["source", "ip"]);
    set_ip(event, kv, "dstip", &["destination", "ip"]);
    set_int_field(event, kv, "srcport", &["source", "port"], 0, 65535);
    set_int_field(event, kv, "dstport", &["destination", "port"], 0, 65535);

    if let Some(proto) = KvLookup::get(kv, "proto") {
        event.set_path(&["network", "protocol"], Value::String(proto.to_lowercase()));
    }

    if let Some(attack) = KvLookup::get(kv, "attack") {
        event.set_path(&["threat", "name"], Value::String(attack.to_string()));
    }
    if let Some(attackid) = KvLookup::get(kv, "attackid") {
        event.set_path(&["threat", "id"], Value::String(attackid.to_string()));
    }
    if let Some(score) = KvLookup::get(kv, "crscore") {
        if let Ok(score) = score.parse::<i64>() {
            event.set_path(&["threat", "score"], Value::Number(score.into()));
        }
    }
    if let Some(action) = KvLookup::get(kv, "craction") {
        event.set_path(&["threat", "action"], Value::String(action.to_string()));
    }

    if let Some(policyid) = KvLookup::get(kv, "policyid") {
        event.set_path(&["rule", "id"], Value::String(policyid.to_string()));
    }

    if let Some(count) = KvLookup::get(kv, "count") {
        if let Ok(count) = count.parse::<i64>() {
            if count >= 0 {
                event.set_path(&["event", "count"], Value::Number(count.into()));
            }
        }
    }

    if let Some(country) = KvLookup::get(kv, "srccountry") {
        event.set_path(
            &["source", "geo", "country_iso_code"],
            Value::String(country.to_string()),
        );
    }
    if let Some(country) = KvLookup::get(kv, "dstcountry") {
        event.set_path(
            &["destination", "geo", "country_iso_code"],
            Value::String(country.to_string()),
        );
    }
}

fn set_ip(event: &mut Event, kv: &Vec<(String, String)>, key: &str, path: &[&str]) {
    if let Some(ip) = KvLookup::get(kv, key) {
        event.set_path(path, Value::String(ip.to_string()));
    }
}

/// Parses an integer field defensively: invalid numerics are omitted
/// entirely rather than stored as a string (spec.md §4.B.5, §8 boundary
/// behaviors — `srcport=abc` leaves `source.port` absent).
fn set_int_field(
    event: &mut Event,
    kv: &Vec<(String, String)>,
    key: &str,
    path: &[&str],
    min: i64,
    max: i64,
) {
    if let Some(raw) = KvLookup::get(kv, key) {
        if let Ok(n) = raw.parse::<i64>() {
            if (min..=max).contains(&n) {
                event.set_path(path, Value::Number(n.into()));
            }
        }
    }
}

fn scan_packets_per_second(event: &mut Event, body: &str) {
    if let Some(captures) = PPS_PATTERN.captures(body) {
        if let Ok(pps) = captures[1].parse::<i64>() {
            if pps >= 0 {
                event.set_path(&["flow", "packets_per_second"], Value::Number(pps.into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passthrough_without_message() {
        let input = json!({"tenant_id": "acme"});
        let output = normalize(input.clone());
        assert_eq!(output, input);
    }

    #[test]
    fn passthrough_non_object() {
        let input = json!(["not", "an", "object"]);
        assert_eq!(normalize(input.clone()), input);
    }

    #[test]
    fn empty_message_preserves_raw() {
        let input = json!({"message": ""});
        let output = normalize(input);
        assert_eq!(output["original"]["message_raw"], "");
    }

    #[test]
    fn fortinet_kv_eventtime_ns_critical() {
        let input = json!({
            "message": "devname=DelawareHotel msg=\"anomaly\" eventtime=1762958299127000000 severity=CRITICAL srcip=1.2.3.4 srcport=443"
        });
        let output = normalize(input);
        assert_eq!(output["host"], "DelawareHotel");
        assert_eq!(output["message"], "anomaly");
        assert_eq!(output["@timestamp"], "2025-11-12T14:38:19.127000+00:00");
        assert_eq!(output["severity"], "critical");
        assert_eq!(output["severity_original"], "CRITICAL");
        assert_eq!(output["source"]["ip"], "1.2.3.4");
        assert_eq!(output["source"]["port"], 443);
        assert!(output["source"]["port"].is_number());
    }

    #[test]
    fn malformed_kv_badkey_no_crash() {
        let input = json!({"message": "badkey= devname=host1"});
        let output = normalize(input);
        assert_eq!(output["host"], "host1");
    }

    #[test]
    fn eventtime_not_a_number_falls_back_to_now() {
        let input = json!({"message": "devname=h eventtime=notanumber"});
        let output = normalize(input);
        assert!(output["@timestamp"].is_string());
        assert!(!output["@timestamp"].as_str().unwrap().is_empty());
    }

    #[test]
    fn srcport_abc_is_absent_never_string() {
        let input = json!({"message": "devname=h srcport=abc"});
        let output = normalize(input);
        assert!(output.get("source").and_then(|s| s.get("port")).is_none());
    }

    #[test]
    fn pps_regex_scan() {
        let input = json!({"message": "devname=h note free text pps 4200 trailer"});
        let output = normalize(input);
        assert_eq!(output["flow"]["packets_per_second"], 4200);
    }

    #[test]
    fn defaults_applied() {
        let input = json!({"message": "devname=h"});
        let output = normalize(input);
        assert_eq!(output["tenant_id"], "default");
        assert_eq!(output["dataset"], "syslog.generic");
        assert_eq!(output["schema_version"], "1.0.0");
    }

    #[test]
    fn date_time_tz_compose() {
        let input = json!({"message": "date=2025-11-03 time=19:15:32 tz=+0000 devname=h"});
        let output = normalize(input);
        assert_eq!(output["@timestamp"], "2025-11-03T19:15:32+00:00");
    }

    #[test]
    fn idempotent_modulo_timestamp_generation() {
        let input = json!({
            "message": "devname=h srcip=1.2.3.4 severity=warning",
            "tenant_id": "acme"
        });
        let once = normalize(input);
        let twice = normalize(once.clone());
        // Normalizing an already-normalized event (no more '=' tokens worth
        // re-parsing out of the replaced `message`) must not change fields
        // other than a freshly-generated @timestamp, which neither call
        // here regenerates since `date`/`time`/`eventtime` are absent and
        // `@timestamp` is already set.
        assert_eq!(once["tenant_id"], twice["tenant_id"]);
        assert_eq!(once["severity"], twice["severity"]);
        assert_eq!(once["host"], twice["host"]);
        assert_eq!(once["@timestamp"], twice["@timestamp"]);
    }

    #[test]
    fn quoted_values_may_contain_spaces() {
        let input = json!({"message": "devname=h msg=\"multi word text here\""});
        let output = normalize(input);
        assert_eq!(output["message"], "multi word text here");
    }
}
