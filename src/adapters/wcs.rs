use crate::domain::model::{BoundingBox, CoverageRequest, GridSpec};
use crate::domain::ports::{CoverageCatalog, CoverageService};
use crate::utils::error::{HarvestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use url::Url;

const WCS_VERSION: &str = "1.0.0";

/// GetCapabilities 中的一個 coverage 摘要
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSummary {
    pub name: String,
    pub label: Option<String>,
    pub lon_lat_envelope: Option<BoundingBox>,
}

/// WCS 1.0.0 KVP 客戶端
#[derive(Debug, Clone)]
pub struct WcsClient {
    client: Client,
    timeout: Duration,
    span: tracing::Span,
}

impl WcsClient {
    pub fn new(timeout: Duration, span: tracing::Span) -> Self {
        Self {
            client: Client::new(),
            timeout,
            span,
        }
    }

    /// 組合請求 URL；端點本身已帶的同名參數會被覆蓋
    pub fn request_url(base: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(base).map_err(|e| HarvestError::InvalidConfigValueError {
            field: "wcs.url".to_string(),
            value: base.to_string(),
            reason: format!("Invalid URL format: {}", e),
        })?;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !params.iter().any(|(p, _)| p.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        Ok(url)
    }

    pub fn coverage_url(request: &CoverageRequest) -> Result<Url> {
        let mut params = vec![
            ("service", "WCS".to_string()),
            ("version", WCS_VERSION.to_string()),
            ("request", "GetCoverage".to_string()),
            ("coverage", request.identifier.clone()),
            ("crs", request.crs.clone()),
            ("bbox", request.bbox.to_query_value()),
            ("format", request.format.clone()),
        ];

        if let Some(time) = &request.time {
            params.push(("time", time.clone()));
        }

        match request.grid {
            GridSpec::Resolution { resx, resy } => {
                params.push(("resx", resx.to_string()));
                params.push(("resy", resy.to_string()));
            }
            GridSpec::Size { width, height } => {
                params.push(("width", width.to_string()));
                params.push(("height", height.to_string()));
            }
        }

        Self::request_url(&request.url, &params)
    }

    async fn fetch(&self, url: Url) -> Result<Vec<u8>> {
        tracing::debug!(parent: &self.span, "📡 WCS request: {}", url);

        let response = self.client.get(url.clone()).timeout(self.timeout).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(HarvestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let is_xml = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("xml"));

        let body = response.bytes().await?.to_vec();

        if let Some(message) = service_exception_message(&body, is_xml) {
            return Err(HarvestError::ServiceException {
                url: url.to_string(),
                message,
            });
        }

        Ok(body)
    }

    async fn fetch_text(&self, url: Url) -> Result<String> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// 某 coverage 的可用時間點；`year` 可篩選年份
    pub async fn time_positions(
        &self,
        base: &str,
        coverage: &str,
        year: Option<i32>,
    ) -> Result<Vec<String>> {
        let url = Self::request_url(
            base,
            &[
                ("service", "WCS".to_string()),
                ("version", WCS_VERSION.to_string()),
                ("request", "DescribeCoverage".to_string()),
                ("coverage", coverage.to_string()),
            ],
        )?;
        let document = self.fetch_text(url).await?;
        let times = parse_time_positions(&document)?;

        Ok(match year {
            None => times,
            Some(year) => times
                .into_iter()
                .filter(|t| time_position_year(t) == Some(year))
                .collect(),
        })
    }

    pub async fn capabilities(&self, base: &str) -> Result<Vec<CoverageSummary>> {
        let url = Self::request_url(
            base,
            &[
                ("service", "WCS".to_string()),
                ("version", WCS_VERSION.to_string()),
                ("request", "GetCapabilities".to_string()),
            ],
        )?;
        let document = self.fetch_text(url).await?;
        parse_capabilities(&document)
    }
}

#[async_trait]
impl CoverageService for WcsClient {
    async fn get_coverage(&self, request: &CoverageRequest) -> Result<Vec<u8>> {
        let url = Self::coverage_url(request)?;
        self.fetch(url).await
    }
}

#[async_trait]
impl CoverageCatalog for WcsClient {
    async fn time_positions(
        &self,
        url: &str,
        coverage: &str,
        year: Option<i32>,
    ) -> Result<Vec<String>> {
        WcsClient::time_positions(self, url, coverage, year).await
    }
}

/// WCS 回傳 200 但內容為 ServiceExceptionReport 時取出訊息
fn service_exception_message(body: &[u8], is_xml: bool) -> Option<String> {
    let looks_like_xml = body
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<');
    if !is_xml && !looks_like_xml {
        return None;
    }

    let text = String::from_utf8_lossy(body);
    if !text.contains("ServiceException") {
        return None;
    }

    let message = element_texts(&text, b"ServiceException")
        .ok()
        .and_then(|messages| messages.into_iter().find(|m| !m.is_empty()))
        .unwrap_or_else(|| text.chars().take(200).collect());
    Some(message)
}

/// Collects the trimmed text of every element whose local name matches,
/// whatever namespace prefix or attributes it carries.
fn element_texts(document: &str, local: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut texts = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == local => {
                current = Some(String::new());
            }
            Event::End(e) if e.local_name().as_ref() == local => {
                if let Some(text) = current.take() {
                    texts.push(text.trim().to_string());
                }
            }
            Event::Text(e) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(texts)
}

pub fn parse_time_positions(document: &str) -> Result<Vec<String>> {
    Ok(element_texts(document, b"timePosition")?
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect())
}

fn time_position_year(time: &str) -> Option<i32> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(time) {
        return Some(dt.with_timezone(&Utc).year());
    }
    time.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| d.year())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BriefField {
    Name,
    Label,
    Pos,
}

impl BriefField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"name" => Some(BriefField::Name),
            b"label" => Some(BriefField::Label),
            b"pos" => Some(BriefField::Pos),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BriefBuilder {
    name: Option<String>,
    label: Option<String>,
    corners: Vec<(f64, f64)>,
}

impl BriefBuilder {
    fn set(&mut self, field: BriefField, text: &str) {
        let text = text.trim();
        match field {
            BriefField::Name if self.name.is_none() => self.name = Some(text.to_string()),
            BriefField::Label if self.label.is_none() => self.label = Some(text.to_string()),
            BriefField::Pos => {
                let mut coords = text.split_whitespace().map(str::parse::<f64>);
                if let (Some(Ok(x)), Some(Ok(y))) = (coords.next(), coords.next()) {
                    self.corners.push((x, y));
                }
            }
            _ => {}
        }
    }

    fn build(self) -> Option<CoverageSummary> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let lon_lat_envelope = match self.corners.as_slice() {
            [(x0, y0), (x1, y1), ..] => Some(BoundingBox::new(*x0, *y0, *x1, *y1)),
            _ => None,
        };
        Some(CoverageSummary {
            name,
            label: self.label,
            lon_lat_envelope,
        })
    }
}

pub fn parse_capabilities(document: &str) -> Result<Vec<CoverageSummary>> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut coverages = Vec::new();
    let mut brief: Option<BriefBuilder> = None;
    let mut field: Option<(BriefField, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                if local.as_ref() == b"CoverageOfferingBrief" {
                    brief = Some(BriefBuilder::default());
                } else if brief.is_some() {
                    field = BriefField::from_local_name(local.as_ref()).map(|f| (f, String::new()));
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                if local.as_ref() == b"CoverageOfferingBrief" {
                    coverages.extend(brief.take().and_then(BriefBuilder::build));
                } else if let (Some(builder), Some((kind, text))) = (brief.as_mut(), field.take()) {
                    builder.set(kind, &text);
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = field.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = field.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(coverages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client() -> WcsClient {
        WcsClient::new(Duration::from_secs(5), tracing::Span::none())
    }

    fn soil_request(url: String) -> CoverageRequest {
        CoverageRequest::geotiff(
            url,
            "4",
            "EPSG:4326",
            BoundingBox::new(149.0, -35.0, 149.1, -34.9),
            GridSpec::Resolution {
                resx: 0.000833,
                resy: 0.000833,
            },
        )
    }

    #[test]
    fn test_coverage_url_contains_kvp_parameters() {
        let url = WcsClient::coverage_url(&soil_request("https://wcs.test/WCSServer".to_string()))
            .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("request".to_string(), "GetCoverage".to_string())));
        assert!(pairs.contains(&("coverage".to_string(), "4".to_string())));
        assert!(pairs.contains(&("bbox".to_string(), "149,-35,149.1,-34.9".to_string())));
        assert!(pairs.contains(&("resx".to_string(), "0.000833".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "width"));
    }

    #[test]
    fn test_request_url_replaces_existing_service_param() {
        let url = WcsClient::request_url(
            "https://gsky.test/ows/geophysics?service=WCS&token=abc",
            &[("service", "WCS".to_string()), ("request", "GetCapabilities".to_string())],
        )
        .unwrap();
        let services = url.query_pairs().filter(|(k, _)| k == "service").count();
        assert_eq!(services, 1);
        assert!(url.query_pairs().any(|(k, v)| k == "token" && v == "abc"));
    }

    #[test]
    fn test_parse_time_positions_and_year_filter() {
        let doc = r#"<CoverageOffering><domainSet><temporalDomain>
            <gml:timePosition>2019-01-01T00:00:00.000Z</gml:timePosition>
            <gml:timePosition>2020-06-01T00:00:00.000Z</gml:timePosition>
        </temporalDomain></domainSet></CoverageOffering>"#;
        let times = parse_time_positions(doc).unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(time_position_year(&times[0]), Some(2019));
        assert_eq!(time_position_year("2020-06-01"), Some(2020));
    }

    #[test]
    fn test_time_positions_with_attributes_and_other_prefixes() {
        let doc = r##"<?xml version="1.0"?>
        <wcs:CoverageDescription xmlns:wcs="http://www.opengis.net/wcs" xmlns:g="http://www.opengis.net/gml">
          <wcs:temporalDomain>
            <g:timePosition frame="#ISO-8601">2019-01-01T00:00:00.000Z</g:timePosition>
            <timePosition><![CDATA[2020-01-01T00:00:00.000Z]]></timePosition>
            <gml:timePosition xmlns:gml="http://www.opengis.net/gml"/>
          </wcs:temporalDomain>
        </wcs:CoverageDescription>"##;
        assert_eq!(
            parse_time_positions(doc).unwrap(),
            vec!["2019-01-01T00:00:00.000Z", "2020-01-01T00:00:00.000Z"]
        );
    }

    #[test]
    fn test_malformed_description_is_an_error() {
        let err = parse_time_positions("<a><gml:timePosition>2019</b></a>").unwrap_err();
        assert!(matches!(err, HarvestError::XmlError(_)));
    }

    #[test]
    fn test_parse_capabilities_without_gml_prefix() {
        let doc = r#"<WCS_Capabilities xmlns="http://www.opengis.net/wcs">
            <ContentMetadata>
              <CoverageOfferingBrief>
                <name>radmap2019_grid_k_conc_awags_rad_2019</name>
                <label>K &amp; Th</label>
                <lonLatEnvelope srsName="WGS84(DD)">
                  <pos dimension="2">110.0 -45.0</pos>
                  <pos dimension="2">155.0 -9.0</pos>
                </lonLatEnvelope>
              </CoverageOfferingBrief>
              <CoverageOfferingBrief><label>no name</label></CoverageOfferingBrief>
            </ContentMetadata>
        </WCS_Capabilities>"#;
        let coverages = parse_capabilities(doc).unwrap();
        assert_eq!(coverages.len(), 1);
        assert_eq!(coverages[0].label.as_deref(), Some("K & Th"));
        assert_eq!(
            coverages[0].lon_lat_envelope,
            Some(BoundingBox::new(110.0, -45.0, 155.0, -9.0))
        );
    }

    #[test]
    fn test_service_exception_message_extraction() {
        let body = br#"<ows:ExceptionReport><ServiceExceptionReport>
            <ServiceException code="x">Layer &lt;99&gt; unknown</ServiceException>
            </ServiceExceptionReport></ows:ExceptionReport>"#;
        assert_eq!(
            service_exception_message(body, false).as_deref(),
            Some("Layer <99> unknown")
        );
        assert_eq!(service_exception_message(b"II*\x00tiff", false), None);
        assert_eq!(service_exception_message(b"<ok/>", true), None);
    }

    #[test]
    fn test_parse_capabilities() {
        let doc = r#"<WCS_Capabilities><ContentMetadata>
            <CoverageOfferingBrief>
              <name>1</name>
              <label>DEM SRTM 1 Second Hydro Enforced</label>
              <lonLatEnvelope srsName="urn:ogc:def:crs:OGC:1.3:CRS84">
                <gml:pos>112.99 -44.0</gml:pos>
                <gml:pos>154.0 -10.0</gml:pos>
              </lonLatEnvelope>
            </CoverageOfferingBrief>
        </ContentMetadata></WCS_Capabilities>"#;
        let coverages = parse_capabilities(doc).unwrap();
        assert_eq!(coverages.len(), 1);
        assert_eq!(coverages[0].name, "1");
        assert_eq!(
            coverages[0].label.as_deref(),
            Some("DEM SRTM 1 Second Hydro Enforced")
        );
        assert_eq!(
            coverages[0].lon_lat_envelope,
            Some(BoundingBox::new(112.99, -44.0, 154.0, -10.0))
        );
    }

    #[tokio::test]
    async fn test_get_coverage_returns_payload() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/WCSServer")
                .query_param("request", "GetCoverage")
                .query_param("coverage", "4");
            then.status(200)
                .header("Content-Type", "image/tiff")
                .body(b"II*\x00fake-tiff".to_vec());
        });

        let bytes = client()
            .get_coverage(&soil_request(server.url("/WCSServer")))
            .await
            .unwrap();

        mock.assert();
        assert!(bytes.starts_with(b"II*"));
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_reason() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/WCSServer");
            then.status(404);
        });

        let err = client()
            .get_coverage(&soil_request(server.url("/WCSServer")))
            .await
            .unwrap_err();

        match err {
            HarvestError::HttpStatus { status, reason, .. } => {
                assert_eq!(status, 404);
                assert_eq!(reason, "Not Found");
            }
            other => panic!("expected HttpStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_service_exception_report_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/WCSServer");
            then.status(200)
                .header("Content-Type", "application/vnd.ogc.se_xml")
                .body(
                    r#"<?xml version="1.0"?><ServiceExceptionReport version="1.2.0">
                    <ServiceException code="InvalidParameterValue">Invalid coverage 99</ServiceException>
                    </ServiceExceptionReport>"#,
                );
        });

        let err = client()
            .get_coverage(&soil_request(server.url("/WCSServer")))
            .await
            .unwrap_err();

        match err {
            HarvestError::ServiceException { message, .. } => {
                assert_eq!(message, "Invalid coverage 99");
            }
            other => panic!("expected ServiceException, got {:?}", other),
        }
    }
}
