// Plant listing and inverter rosters

use tracing::{debug, warn};

use crate::auth::AccessToken;
use crate::client::SunsynkClient;
use crate::error::Error;
use crate::models::{InverterPage, InverterRoster, PlantPage, SiteId};

impl SunsynkClient {
    /// Fetch one page of the fleet listing.
    ///
    /// `GET /api/v1/plants?page={page}&limit={page_size}`, retried under the
    /// client's policy. A page without `data` is an empty page.
    pub async fn list_plants(&self, token: &AccessToken, page: u32) -> Result<PlantPage, Error> {
        let page_str = page.to_string();
        let limit = self.page_size().to_string();
        let url = self.api_url(
            "api/v1/plants",
            &[("page", page_str.as_str()), ("limit", limit.as_str())],
        )?;

        let what = format!("plants page {page}");
        let data: Option<PlantPage> = self
            .policy()
            .retrying(&what, || self.get(url.clone(), token))
            .await?;

        let page_data = data.unwrap_or_default();
        debug!(page, plants = page_data.infos.len(), "plant page fetched");
        Ok(page_data)
    }

    /// Fetch a site's inverter roster, serial → type tag, in upstream order.
    ///
    /// `GET /api/v1/plant/{id}/inverters`. A response without `data.infos`
    /// yields an empty roster: a site with no inverters is a legitimate
    /// state, not an error.
    pub async fn list_inverters(
        &self,
        token: &AccessToken,
        site_id: &SiteId,
    ) -> Result<InverterRoster, Error> {
        let url = self.api_url(
            &format!("api/v1/plant/{site_id}/inverters"),
            &[
                ("page", "1"),
                ("limit", "10"),
                ("status", "-1"),
                ("sn", ""),
                ("id", site_id.as_str()),
                ("type", "-2"),
            ],
        )?;

        let what = format!("inverters of site {site_id}");
        let data: Option<InverterPage> = self
            .policy()
            .retrying(&what, || self.get(url.clone(), token))
            .await?;

        let Some(page) = data else {
            warn!(%site_id, "no inverter data returned");
            return Ok(InverterRoster::new());
        };

        let roster: InverterRoster = page
            .infos
            .into_iter()
            .map(|inv| (inv.sn, inv.equip_mode))
            .collect();
        debug!(%site_id, inverters = roster.len(), "inverter roster fetched");
        Ok(roster)
    }
}
