// Rackwatch Exporter - Source pollers
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fetching raw documents from server BMCs, power shelves and CDUs.
//!
//! A poller never interprets a document. Each endpoint yields the parsed
//! JSON body or a [`PollFailure`]; the engine decides what to do with it.

use crate::settings::{BasicAuth, ExporterConfig, Result};
use async_trait::async_trait;
use rackwatch::source::{PSU_SLOTS, SERVER_POWER_SENSORS};
use rackwatch::{
    ChassisFeed, CduDescriptor, CduPoll, PollFailure, PollResult, PowerShelfPoll, ServerPoll,
    SourceDescriptor,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches every endpoint of one source.
#[async_trait]
pub trait SourcePoller: Send + Sync {
    /// Thermal collection and power sensors of a BMC.
    async fn poll_server(&self, source: &SourceDescriptor) -> ServerPoll;

    /// Output power, PSU slot status and chassis feed status of a shelf.
    async fn poll_power_shelf(&self, source: &SourceDescriptor) -> PowerShelfPoll;

    /// The CDU data document.
    async fn poll_cdu(&self, source: &CduDescriptor) -> CduPoll;
}

/// Redfish resource URL on a controller.
pub fn redfish_url(address: &str, resource: &str) -> String {
    format!("https://{address}/redfish/v1/{resource}")
}

/// HTTP client for one source kind.
#[derive(Debug, Clone)]
struct SourceClient {
    client: reqwest::Client,
    credentials: Option<BasicAuth>,
}

impl SourceClient {
    fn new(timeout: Duration, credentials: Option<BasicAuth>) -> Result<Self> {
        // BMCs and shelf controllers serve self-signed certificates
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    async fn get_json(&self, url: &str) -> PollResult {
        let mut request = self.client.get(url);
        if let Some(auth) = &self.credentials {
            request = request.basic_auth(&auth.username, auth.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PollFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollFailure::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PollFailure::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| PollFailure::Parse(e.to_string()))
    }
}

/// [`SourcePoller`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpPoller {
    bmc: SourceClient,
    powershelf: SourceClient,
    cdu: SourceClient,
    cdu_fixture: Option<PathBuf>,
}

impl HttpPoller {
    pub fn new(config: &ExporterConfig) -> Result<Self> {
        let timeouts = &config.timeouts;
        let credentials = &config.credentials;
        Ok(Self {
            bmc: SourceClient::new(timeouts.bmc(), credentials.bmc.clone())?,
            powershelf: SourceClient::new(timeouts.powershelf(), credentials.powershelf.clone())?,
            cdu: SourceClient::new(timeouts.cdu(), None)?,
            cdu_fixture: config.exporter.cdu_fixture_path.clone(),
        })
    }
}

/// Read a CDU document from a fixture file.
pub async fn read_fixture(path: &std::path::Path) -> PollResult {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PollFailure::Io(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| PollFailure::Parse(e.to_string()))
}

#[async_trait]
impl SourcePoller for HttpPoller {
    async fn poll_server(&self, source: &SourceDescriptor) -> ServerPoll {
        let address = source.address.as_str();
        let thermal = self
            .bmc
            .get_json(&redfish_url(address, "Chassis/Self/Thermal"))
            .await;

        let mut power = Vec::with_capacity(SERVER_POWER_SENSORS.len());
        for (sensor, _) in SERVER_POWER_SENSORS {
            let url = redfish_url(address, &format!("Chassis/Self/Sensors/{sensor}"));
            power.push((sensor.to_string(), self.bmc.get_json(&url).await));
        }

        ServerPoll {
            source: source.clone(),
            thermal,
            power,
        }
    }

    async fn poll_power_shelf(&self, source: &SourceDescriptor) -> PowerShelfPoll {
        let address = source.address.as_str();
        let output_power = self
            .powershelf
            .get_json(&redfish_url(address, "Chassis/chassis/Sensors/chassis_output_power"))
            .await;

        let mut psu_status = Vec::new();
        for slot in PSU_SLOTS {
            let url = redfish_url(address, &format!("Chassis/chassis/Power/Oem/tsmc/PSU{slot}"));
            psu_status.push((slot, self.powershelf.get_json(&url).await));
        }

        let mut chassis_status = Vec::with_capacity(ChassisFeed::ALL.len());
        for feed in ChassisFeed::ALL {
            let url = redfish_url(
                address,
                &format!("Chassis/chassis/Sensors/{}", feed.sensor_resource()),
            );
            chassis_status.push((feed, self.powershelf.get_json(&url).await));
        }

        PowerShelfPoll {
            source: source.clone(),
            output_power,
            psu_status,
            chassis_status,
        }
    }

    async fn poll_cdu(&self, source: &CduDescriptor) -> CduPoll {
        let rack = source.rack_name.as_str();
        let document = match (&self.cdu_fixture, &source.url) {
            (Some(fixture), _) if fixture.exists() => {
                info!(rack, fixture = %fixture.display(), "Using CDU test input");
                read_fixture(fixture).await
            }
            (_, Some(url)) => {
                debug!(rack, url = %url, "Fetching CDU data");
                self.cdu.get_json(url).await
            }
            (_, None) => Err(PollFailure::Transport("no CDU url configured".to_string())),
        };

        CduPoll {
            source: source.clone(),
            document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_redfish_url() {
        assert_eq!(
            redfish_url("10.0.0.11", "Chassis/Self/Thermal"),
            "https://10.0.0.11/redfish/v1/Chassis/Self/Thermal"
        );
    }

    #[tokio::test]
    async fn test_cdu_fixture_overrides_url() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"responses": [{"T_WI": 21.5}]}"#).unwrap();

        let mut config = ExporterConfig::default();
        config.exporter.cdu_fixture_path = Some(file.path().to_path_buf());
        let poller = HttpPoller::new(&config).unwrap();

        // Unroutable URL: only the fixture can satisfy this poll
        let cdu = CduDescriptor::new("http://192.0.2.1:9/unused", "R01");
        let poll = poller.poll_cdu(&cdu).await;
        assert_eq!(poll.document, Ok(json!({"responses": [{"T_WI": 21.5}]})));
    }

    #[tokio::test]
    async fn test_fixture_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let result = read_fixture(file.path()).await;
        assert!(matches!(result, Err(PollFailure::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_fixture_is_io_error() {
        let result = read_fixture(std::path::Path::new("/nonexistent/cdu.json")).await;
        assert!(matches!(result, Err(PollFailure::Io(_))));
    }
}
