// Day-granularity inverter telemetry

use chrono::NaiveDate;
use tracing::debug;

use crate::auth::AccessToken;
use crate::client::SunsynkClient;
use crate::error::Error;
use crate::models::DayTelemetry;

/// Telemetry metrics this system reads, with their upstream parameter
/// codes and the labels the API answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Battery state of charge, percent.
    StateOfCharge,
    /// Battery voltage as measured by the inverter.
    BatteryVoltage,
    /// Battery voltage as reported by the BMS.
    BmsVoltage,
}

impl Metric {
    pub fn code(self) -> u16 {
        match self {
            Self::StateOfCharge => 16,
            Self::BatteryVoltage => 18,
            Self::BmsVoltage => 106,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::StateOfCharge => "SOC",
            Self::BatteryVoltage => "V-bat",
            Self::BmsVoltage => "BMS Voltage",
        }
    }

    /// Comma-separated parameter list for one combined request.
    pub fn codes(metrics: &[Self]) -> String {
        metrics
            .iter()
            .map(|m| m.code().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl SunsynkClient {
    /// Fetch one calendar day of the given metrics for an inverter.
    ///
    /// `GET /api/v1/inverter/{sn}/day?sn&date&edate&lan=en&params={codes}`.
    /// All metrics travel in one request. Retried under the client's
    /// policy; a response without `data` is a deserialization error.
    pub async fn day_telemetry(
        &self,
        token: &AccessToken,
        serial: &str,
        date: NaiveDate,
        metrics: &[Metric],
    ) -> Result<DayTelemetry, Error> {
        let day = date.format("%Y-%m-%d").to_string();
        let params = Metric::codes(metrics);
        let url = self.api_url(
            &format!("api/v1/inverter/{serial}/day"),
            &[
                ("sn", serial),
                ("date", day.as_str()),
                ("edate", day.as_str()),
                ("lan", "en"),
                ("params", params.as_str()),
            ],
        )?;

        let what = format!("telemetry {serial} {day}");
        let data: Option<DayTelemetry> = self
            .policy()
            .retrying(&what, || self.get(url.clone(), token))
            .await?;

        let telemetry = data.ok_or_else(|| Error::Deserialization {
            message: format!("day telemetry for {serial} on {day} carried no data"),
            body: String::new(),
        })?;
        debug!(serial, %day, series = telemetry.infos.len(), "telemetry fetched");
        Ok(telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_codes() {
        assert_eq!(
            Metric::codes(&[
                Metric::StateOfCharge,
                Metric::BatteryVoltage,
                Metric::BmsVoltage
            ]),
            "16,18,106"
        );
        assert_eq!(Metric::codes(&[Metric::StateOfCharge]), "16");
    }
}
