use crate::domain::model::BoundingBox;
use crate::utils::error::{HarvestError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct StacSearch {
    pub bbox: BoundingBox,
    pub collections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    pub limit: usize,
}

impl StacSearch {
    pub fn new(bbox: BoundingBox, collections: Vec<String>) -> Self {
        Self {
            bbox,
            collections,
            datetime: None,
            limit: 10,
        }
    }

    /// 只有起迄日期都提供時才設定 datetime 範圍
    pub fn with_date_range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        if let (Some(start), Some(end)) = (start, end) {
            self.datetime = Some(format!("{}/{}", start, end));
        }
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacAsset {
    pub href: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacItem {
    pub id: String,
    pub collection: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

impl StacItem {
    pub fn datetime(&self) -> Option<&str> {
        self.properties.get("datetime").and_then(|v| v.as_str())
    }

    /// 優先取指定 key 的資產，否則取第一個 role 為 data 的資產
    pub fn data_asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key).or_else(|| {
            self.assets
                .values()
                .find(|a| a.roles.iter().any(|r| r == "data"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<StacItem>,
}

/// STAC API `/search` 客戶端
#[derive(Debug, Clone)]
pub struct StacClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    span: tracing::Span,
}

impl StacClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, span: tracing::Span) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
            span,
        }
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }

    pub async fn search(&self, query: &StacSearch) -> Result<Vec<StacItem>> {
        let url = self.search_url();
        tracing::debug!(parent: &self.span, "🛰️ STAC search {} collections={:?}", url, query.collections);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::HttpStatus {
                url,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let collection: ItemCollection = response.json().await?;
        tracing::info!(parent: &self.span, "🛰️ Found {} items", collection.features.len());
        Ok(collection.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_search_body_shape() {
        let query = StacSearch::new(
            BoundingBox::new(149.0, -35.0, 149.1, -34.9),
            vec!["cop-dem-glo-30".to_string()],
        )
        .with_date_range(Some("2021-01-01"), Some("2021-12-31"))
        .with_limit(5);

        let body = serde_json::to_value(&query).unwrap();
        assert_eq!(body["bbox"], serde_json::json!([149.0, -35.0, 149.1, -34.9]));
        assert_eq!(body["datetime"], "2021-01-01/2021-12-31");
        assert_eq!(body["limit"], 5);
    }

    #[test]
    fn test_datetime_omitted_without_both_dates() {
        let query = StacSearch::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), vec![])
            .with_date_range(Some("2021-01-01"), None);
        let body = serde_json::to_value(&query).unwrap();
        assert!(body.get("datetime").is_none());
    }

    #[tokio::test]
    async fn test_search_parses_items_and_assets() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/search")
                .json_body_partial(r#"{"collections": ["cop-dem-glo-30"]}"#);
            then.status(200)
                .header("Content-Type", "application/geo+json")
                .json_body(serde_json::json!({
                    "type": "FeatureCollection",
                    "features": [{
                        "type": "Feature",
                        "id": "Copernicus_DSM_COG_10_S35_00_E149_00_DEM",
                        "collection": "cop-dem-glo-30",
                        "properties": {"datetime": "2021-04-22T00:00:00Z"},
                        "assets": {
                            "data": {
                                "href": "https://copernicus-dem-30m.s3.amazonaws.com/tile.tif",
                                "type": "image/tiff; application=geotiff; profile=cloud-optimized",
                                "roles": ["data"]
                            }
                        }
                    }]
                }));
        });

        let client = StacClient::new(
            server.url("/v1/"),
            Duration::from_secs(5),
            tracing::Span::none(),
        );
        let query = StacSearch::new(
            BoundingBox::new(149.0, -35.0, 149.1, -34.9),
            vec!["cop-dem-glo-30".to_string()],
        );
        let items = client.search(&query).await.unwrap();

        mock.assert();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].datetime(), Some("2021-04-22T00:00:00Z"));
        assert_eq!(
            items[0].data_asset("data").map(|a| a.href.as_str()),
            Some("https://copernicus-dem-30m.s3.amazonaws.com/tile.tif")
        );
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/search");
            then.status(502);
        });

        let client = StacClient::new(server.base_url(), Duration::from_secs(5), tracing::Span::none());
        let query = StacSearch::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), vec![]);
        let err = client.search(&query).await.unwrap_err();
        assert_eq!(err.status_code(), Some(502));
    }
}
