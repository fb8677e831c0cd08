use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::config::InfluxConfig;
use crate::stat::ServerAggregate;

/// Measurement name for all written points.
const MEASUREMENT: &str = "stat";

/// One time-series point, validated for line-protocol representability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, i64>,
    timestamp: i64,
}

impl Point {
    /// Builds a point, validating every part against the line protocol.
    ///
    /// Newlines cannot be escaped and empty keys or values are not
    /// representable, so both are rejected here rather than at the store.
    pub fn new(
        measurement: &str,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, i64>,
        timestamp: i64,
    ) -> Result<Self> {
        if measurement.is_empty() {
            bail!("point measurement must not be empty");
        }
        if fields.is_empty() {
            bail!("point must carry at least one field");
        }

        for part in std::iter::once(measurement)
            .chain(tags.iter().flat_map(|(k, v)| [k.as_str(), v.as_str()]))
            .chain(fields.keys().map(String::as_str))
        {
            if part.is_empty() {
                bail!("point tag and field keys and values must not be empty");
            }
            if part.contains('\n') || part.contains('\r') {
                bail!("line protocol cannot encode newlines: {part:?}");
            }
        }

        Ok(Self {
            measurement: measurement.to_string(),
            tags,
            fields,
            timestamp,
        })
    }

    /// Appends the point's line-protocol representation to `out`.
    ///
    /// Tags render in key order; integer fields carry the `i` suffix.
    fn write_line(&self, out: &mut String) {
        out.push_str(&escape_measurement(&self.measurement));

        for (key, value) in &self.tags {
            out.push(',');
            out.push_str(&escape_tag(key));
            out.push('=');
            out.push_str(&escape_tag(value));
        }

        out.push(' ');
        for (idx, (key, value)) in self.fields.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}={value}i", escape_tag(key));
        }

        let _ = write!(out, " {}", self.timestamp);
        out.push('\n');
    }
}

/// A batch of points destined for one database, committed in a single write.
#[derive(Debug)]
pub struct BatchPoints {
    database: String,
    points: Vec<Point>,
}

impl BatchPoints {
    /// Creates an empty batch for the given database.
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            points: Vec::new(),
        }
    }

    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Renders the whole batch as a line-protocol body.
    pub fn body(&self) -> String {
        let mut out = String::with_capacity(self.points.len() * 64);
        for point in &self.points {
            point.write_line(&mut out);
        }
        out
    }
}

/// HTTP writer for the InfluxDB write API.
///
/// The client is scoped to one cycle's write and dropped on every exit path.
pub struct InfluxWriter {
    http: reqwest::Client,
    address: String,
}

impl InfluxWriter {
    /// Creates a writer for the given connection parameters.
    pub fn new(cfg: &InfluxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("building influxdb HTTP client")?;

        Ok(Self {
            http,
            address: cfg.address.clone(),
        })
    }

    /// Commits one batch in a single write call.
    ///
    /// The store accepts or rejects the batch as a whole; a non-success status
    /// fails the cycle with the server's diagnostic body. No retry.
    pub async fn write(&self, batch: &BatchPoints) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let body = batch.body();
        let bytes = body.len();

        let url = format!("{}/write", self.address);
        let response = self
            .http
            .post(&url)
            .query(&[("db", batch.database()), ("precision", "s")])
            .body(body)
            .send()
            .await
            .with_context(|| format!("writing batch to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("influxdb write returned {status}: {body}");
        }

        // Drain body for connection reuse.
        let _ = response.bytes().await;

        debug!(points = batch.len(), bytes, "wrote batch");

        Ok(())
    }
}

/// Converts the cycle's aggregate into points and commits them as one batch.
///
/// An empty aggregate performs no store call and is not an error. A single
/// point that fails to encode aborts the cycle before anything is sent.
/// Points carry the write-time timestamp at second precision, captured once
/// for the whole batch.
pub async fn write_aggregate(cfg: &InfluxConfig, aggregate: &ServerAggregate) -> Result<()> {
    if aggregate.is_empty() {
        return Ok(());
    }

    let writer = InfluxWriter::new(cfg)?;
    let batch = build_batch(&cfg.database, aggregate, Utc::now().timestamp())?;

    writer.write(&batch).await
}

/// Builds the batch for one aggregate at the given write timestamp.
fn build_batch(
    database: &str,
    aggregate: &ServerAggregate,
    timestamp: i64,
) -> Result<BatchPoints> {
    let mut batch = BatchPoints::new(database);

    for (server, stats) in aggregate {
        for stat in stats {
            let tags = BTreeMap::from([
                ("server".to_string(), server.clone()),
                ("user".to_string(), stat.user.clone()),
                ("type".to_string(), stat.kind.clone()),
            ]);
            let fields = BTreeMap::from([("value".to_string(), stat.value)]);

            let point = Point::new(MEASUREMENT, tags, fields, timestamp)
                .with_context(|| format!("encoding point for server {server:?}"))?;
            batch.add_point(point);
        }
    }

    Ok(batch)
}

// --- Line protocol escaping ---

/// Escapes a measurement name (commas and spaces).
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escapes a tag key, tag value, or field key (commas, equals signs, spaces).
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}
