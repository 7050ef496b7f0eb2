use super::{
    Sink,
    SinkError,
};
use crate::metrics::{
    line_protocol::{
        encode_line,
        Flavor,
    },
    FilteredRecord,
};
use chrono::{
    DateTime,
    Utc,
};
use metrics_fetcher_config::InfluxConfig;
use reqwest::{
    header::CONTENT_TYPE,
    Client as HttpClient,
};
use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
};
use url::Url;

/// Pushes each batch to the InfluxDB 1.x `/write` endpoint.
pub struct InfluxSink {
    client: HttpClient,
    write_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxSink {
    pub fn new(client: HttpClient, config: &InfluxConfig) -> Result<Self, SinkError> {
        let address = config
            .address
            .as_ref()
            .ok_or_else(|| SinkError::InvalidAddress("<unset>".to_string()))?;

        let mut write_url = address.clone();
        write_url
            .path_segments_mut()
            .map_err(|_| SinkError::InvalidAddress(address.to_string()))?
            .pop_if_empty()
            .push("write");
        write_url
            .query_pairs_mut()
            .append_pair("db", &config.database)
            .append_pair("rp", &config.retention)
            .append_pair("precision", "ns");

        Ok(Self {
            client,
            write_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Returns the request body and the number of points in it.
    fn encode_batch(
        records: &[FilteredRecord],
        extra_tags: &BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> (String, usize) {
        let timestamp = timestamp.timestamp_nanos_opt();
        let mut body = String::new();
        let mut points = 0;
        for record in records {
            match encode_line(record, extra_tags, Flavor::Influx, timestamp) {
                Ok(line) => {
                    debug!(measurement = %record.measurement, "Adding point to batch");
                    body.push_str(&line);
                    points += 1;
                }
                Err(e) => warn!(measurement = %record.measurement, error = %e, "Skipping metric"),
            }
        }
        (body, points)
    }
}

impl Sink for InfluxSink {
    fn emit<'a>(
        &'a mut self,
        records: &'a [FilteredRecord],
        extra_tags: &'a BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let (body, points) = Self::encode_batch(records, extra_tags, timestamp);
            if points == 0 {
                warn!("No points added to a batch - not sending to Influx");
                return Ok(());
            }

            let db_host = self.write_url.host_str().unwrap_or_default();
            info!(db_host, points, "Sending metrics to InfluxDB");

            let mut request = self
                .client
                .post(self.write_url.clone())
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body);
            if let Some(username) = &self.username {
                request = request.basic_auth(username, self.password.as_ref());
            }

            let response = request.send().await.map_err(|source| SinkError::Http {
                url: self.write_url.to_string(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!(db_host, status = status.as_u16(), "Error sending metrics to InfluxDB");
                return Err(SinkError::Status {
                    url: self.write_url.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }

            debug!(db_host, points, "Batch written");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "influxdb"
    }
}
