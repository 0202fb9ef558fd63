use airlane_core::airport::{Airport, CityRef, Route};
use airlane_core::repository::{AirportRepository, RouteRepository, StoreError};
use airlane_shared::Coordinate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

pub struct PgAirportRepository {
    pool: PgPool,
}

impl PgAirportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AirportRow {
    id: Uuid,
    name: String,
    iata_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    city_id: Uuid,
    city_name: String,
    country: String,
}

#[derive(sqlx::FromRow)]
struct CoordinateRow {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn coordinate(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Coordinate>, StoreError> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Coordinate::new(lat, lon)
            .map(Some)
            .map_err(|e| StoreError::Database(e.to_string())),
        _ => Ok(None),
    }
}

impl TryFrom<AirportRow> for Airport {
    type Error = StoreError;

    fn try_from(row: AirportRow) -> Result<Self, Self::Error> {
        Ok(Airport {
            id: row.id,
            name: row.name,
            iata_code: row.iata_code,
            coordinate: coordinate(row.latitude, row.longitude)?,
            city: CityRef {
                id: row.city_id,
                name: row.city_name,
                country: row.country,
            },
        })
    }
}

const AIRPORT_SELECT: &str = r#"
    SELECT a.id, a.name, a.iata_code, a.latitude, a.longitude,
           c.id AS city_id, c.name AS city_name, c.country
    FROM airports a
    JOIN cities c ON c.id = a.city_id
"#;

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

#[async_trait]
impl AirportRepository for PgAirportRepository {
    async fn get_airport(&self, id: Uuid) -> Result<Option<Airport>, StoreError> {
        sqlx::query_as::<_, AirportRow>(&format!("{} WHERE a.id = $1", AIRPORT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Airport::try_from)
            .transpose()
    }

    async fn set_coordinate_if_absent(
        &self,
        id: Uuid,
        coordinate: Coordinate,
    ) -> Result<Coordinate, StoreError> {
        // The row lock taken by UPDATE makes a concurrent writer wait and
        // then see the stored value.
        let updated = sqlx::query(
            "UPDATE airports SET latitude = $2, longitude = $3 WHERE id = $1 AND latitude IS NULL",
        )
        .bind(id)
        .bind(coordinate.latitude())
        .bind(coordinate.longitude())
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        if updated == 1 {
            debug!("Stored coordinate for airport {}", id);
            return Ok(coordinate);
        }

        let row = sqlx::query_as::<_, CoordinateRow>("SELECT latitude, longitude FROM airports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("airport {}", id)))?;

        coordinate_or_missing(id, row)
    }

    async fn list_missing_coordinates(&self) -> Result<Vec<Airport>, StoreError> {
        sqlx::query_as::<_, AirportRow>(&format!(
            "{} WHERE a.latitude IS NULL ORDER BY a.name",
            AIRPORT_SELECT
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(Airport::try_from)
        .collect()
    }
}

fn coordinate_or_missing(id: Uuid, row: CoordinateRow) -> Result<Coordinate, StoreError> {
    coordinate(row.latitude, row.longitude)?
        .ok_or_else(|| StoreError::Database(format!("airport {} has no coordinate after update", id)))
}

pub struct PgRouteRepository {
    pool: PgPool,
}

impl PgRouteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: Uuid,
    source_id: Uuid,
    destination_id: Uuid,
    distance_km: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<RouteRow> for Route {
    type Error = StoreError;

    fn try_from(row: RouteRow) -> Result<Self, Self::Error> {
        Ok(Route {
            id: row.id,
            source_airport_id: row.source_id,
            destination_airport_id: row.destination_id,
            distance_km: u32::try_from(row.distance_km)
                .map_err(|e| StoreError::Database(format!("route {}: {}", row.id, e)))?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl RouteRepository for PgRouteRepository {
    async fn find_route(
        &self,
        source_airport_id: Uuid,
        destination_airport_id: Uuid,
    ) -> Result<Option<Route>, StoreError> {
        sqlx::query_as::<_, RouteRow>(
            r#"
            SELECT id, source_id, destination_id, distance_km, created_at
            FROM routes
            WHERE source_id = $1 AND destination_id = $2
            "#,
        )
        .bind(source_airport_id)
        .bind(destination_airport_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(Route::try_from)
        .transpose()
    }

    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        let distance_km = i32::try_from(route.distance_km)
            .map_err(|e| StoreError::Database(format!("route {}: {}", route.id, e)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO routes (id, source_id, destination_id, distance_km, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_id, destination_id) DO NOTHING
            "#,
        )
        .bind(route.id)
        .bind(route.source_airport_id)
        .bind(route.destination_airport_id)
        .bind(distance_km)
        .bind(route.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::Conflict(format!(
                "route {} -> {}",
                route.source_airport_id, route.destination_airport_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_airport_row_without_coordinate() {
        let airport = Airport::try_from(AirportRow {
            id: Uuid::new_v4(),
            name: "Boryspil".into(),
            iata_code: Some("KBP".into()),
            latitude: None,
            longitude: None,
            city_id: Uuid::new_v4(),
            city_name: "Kyiv".into(),
            country: "Ukraine".into(),
        })
        .unwrap();

        assert!(airport.coordinate.is_none());
        assert_eq!(airport.city.name, "Kyiv");
    }

    #[test]
    fn test_out_of_range_coordinate_is_a_storage_error() {
        assert!(matches!(coordinate(Some(123.0), Some(0.0)), Err(StoreError::Database(_))));
        assert_eq!(coordinate(Some(50.45), None).unwrap(), None);
    }

    #[test]
    fn test_negative_distance_is_rejected() {
        let row = RouteRow {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            destination_id: Uuid::new_v4(),
            distance_km: -5,
            created_at: Utc::now(),
        };
        assert!(matches!(Route::try_from(row), Err(StoreError::Database(_))));
    }
}
