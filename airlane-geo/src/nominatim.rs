use airlane_core::geocoding::{GeoQuery, GeocodeError, Geocoder};
use airlane_shared::Coordinate;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// Geocoder backed by an OpenStreetMap Nominatim `/search` endpoint.
#[derive(Clone)]
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying User-Agent.
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &GeoQuery) -> Result<Coordinate, GeocodeError> {
        let text = query.as_text();
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", text.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(GeocodeError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(GeocodeError::InvalidResponse(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;
        debug!("Nominatim answered {} bytes for {:?}", body.len(), text);

        parse_places(&body, &text)
    }
}

/// Take the best (first) match of a Nominatim JSON answer.
fn parse_places(body: &str, query_text: &str) -> Result<Coordinate, GeocodeError> {
    let places: Vec<Place> =
        serde_json::from_str(body).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

    let place = places
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NotFound(query_text.to_string()))?;

    let latitude: f64 = place
        .lat
        .parse()
        .map_err(|_| GeocodeError::InvalidResponse(format!("latitude {:?}", place.lat)))?;
    let longitude: f64 = place
        .lon
        .parse()
        .map_err(|_| GeocodeError::InvalidResponse(format!("longitude {:?}", place.lon)))?;

    Coordinate::new(latitude, longitude).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_place() {
        let body = r#"[
            {"place_id": 1, "lat": "49.8397", "lon": "24.0297", "display_name": "Lviv, Ukraine"},
            {"place_id": 2, "lat": "0", "lon": "0"}
        ]"#;
        let coordinate = parse_places(body, "Lviv, Ukraine").unwrap();
        assert_eq!(coordinate, Coordinate::new(49.8397, 24.0297).unwrap());
    }

    #[test]
    fn test_empty_answer_is_not_found() {
        let result = parse_places("[]", "Atlantis, Nowhere");
        assert_eq!(result, Err(GeocodeError::NotFound("Atlantis, Nowhere".into())));
    }

    #[test]
    fn test_garbage_is_invalid_response() {
        assert!(matches!(
            parse_places(r#"{"error": "bad"}"#, "x"),
            Err(GeocodeError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_places(r#"[{"lat": "95.0", "lon": "10.0"}]"#, "x"),
            Err(GeocodeError::InvalidResponse(_))
        ));
    }
}
