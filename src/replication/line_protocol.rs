//! InfluxDB v2 line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! Every field this node writes is a float.

/// One point ready to be encoded
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp_ns: i64,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp_ns: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ns,
        }
    }

    /// Add a tag; empty values are dropped since the protocol rejects them.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.tags.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn field(mut self, key: &str, value: f64) -> Self {
        self.fields.push((key.to_string(), value));
        self
    }

    /// Encode as one line, or `None` when the point carries no field.
    pub fn to_line(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);

        // tags sorted by key for canonical form
        let mut sorted_tags: Vec<_> = self.tags.iter().collect();
        sorted_tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in sorted_tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape_key(key), value))
            .collect();
        line.push_str(&fields.join(","));

        line.push(' ');
        line.push_str(&self.timestamp_ns.to_string());

        Some(line)
    }
}

/// Encode many points into one request body, skipping field-less points.
pub fn encode_batch(points: &[Point]) -> String {
    points
        .iter()
        .filter_map(Point::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Measurement names escape commas and spaces.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
