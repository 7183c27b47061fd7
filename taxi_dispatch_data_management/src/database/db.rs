use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::{
    query, query_as,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Pool, Row, Sqlite,
};
use taxi_dispatch_lib::{
    company::{Company, CompanySummary},
    compliance::{ComplianceReportAttempt, NewReportAttempt, ReportKind},
    driver::{AvailableDriver, Driver, NewDriver},
    location_ping::{LocationPing, NewLocationPing},
    status::AccountStatus,
    trip_log::{NewTripLog, TripLogEvent, TripLogKind},
    user::UserAccount,
    vehicle::Vehicle,
};

use crate::{DataManagerError, DATABASE_PATH};

#[derive(Clone)]
pub struct DispatchDatabase {
    pool: Pool<Sqlite>,
}

impl DispatchDatabase {
    /// Opens (and if necessary creates) the workspace-local database file.
    pub async fn connect() -> Result<Self, DataManagerError> {
        let root: PathBuf = project_root::get_project_root()
            .map_err(|err| DataManagerError::Setup(format!("failed to locate project root: {err}")))?;
        let options = SqliteConnectOptions::new()
            .filename(root.join(DATABASE_PATH))
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// A private in-memory database on a single pooled connection, for tests.
    pub async fn connect_in_memory() -> Result<Self, DataManagerError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        // One connection that never retires, otherwise the database
        // vanishes between acquires.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    pub async fn init(&self) -> Result<(), DataManagerError> {
        self.pool
            .execute(
                "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                taxi_license_number TEXT,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vehicles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                license_plate TEXT NOT NULL,
                brand TEXT NOT NULL,
                model TEXT NOT NULL,
                color TEXT,
                FOREIGN KEY(company_id) REFERENCES companies(id)
            );

            CREATE TABLE IF NOT EXISTS drivers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                company_id INTEGER NOT NULL,
                vehicle_id INTEGER,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                phone TEXT NOT NULL,
                taxi_driver_license TEXT NOT NULL,
                status TEXT NOT NULL,
                is_online BOOLEAN NOT NULL DEFAULT 0,
                current_latitude REAL,
                current_longitude REAL,
                last_location_update TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY(user_id) REFERENCES users(id),
                FOREIGN KEY(company_id) REFERENCES companies(id),
                FOREIGN KEY(vehicle_id) REFERENCES vehicles(id)
            );

            CREATE TABLE IF NOT EXISTS location_updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                driver_id INTEGER NOT NULL,
                vehicle_id INTEGER,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                accuracy REAL,
                speed REAL,
                heading REAL,
                altitude REAL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY(driver_id) REFERENCES drivers(id)
            );

            CREATE TABLE IF NOT EXISTS trip_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_type TEXT NOT NULL,
                parent_id INTEGER,
                company_id INTEGER NOT NULL,
                vehicle_id INTEGER,
                driver_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                start_latitude REAL,
                start_longitude REAL,
                start_address TEXT,
                end_latitude REAL,
                end_longitude REAL,
                end_address TEXT,
                distance REAL,
                duration INTEGER,
                final_price REAL,
                tariff_used TEXT,
                trip_start_time TIMESTAMP,
                trip_end_time TIMESTAMP,
                log_details TEXT,
                start_reported BOOLEAN NOT NULL DEFAULT 0,
                end_reported BOOLEAN NOT NULL DEFAULT 0,
                report_error TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY(driver_id) REFERENCES drivers(id),
                FOREIGN KEY(parent_id) REFERENCES trip_logs(id)
            );

            CREATE INDEX IF NOT EXISTS idx_trip_logs_driver_created
                ON trip_logs(driver_id, created_at);

            CREATE TABLE IF NOT EXISTS vehicle_trip_state (
                vehicle_id INTEGER PRIMARY KEY,
                open_trip_log_id INTEGER NOT NULL,
                FOREIGN KEY(open_trip_log_id) REFERENCES trip_logs(id)
            );

            CREATE TABLE IF NOT EXISTS compliance_report_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_log_id INTEGER NOT NULL,
                request_kind TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                payload TEXT NOT NULL,
                response TEXT,
                status_code INTEGER NOT NULL,
                success BOOLEAN NOT NULL,
                error_message TEXT,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY(trip_log_id) REFERENCES trip_logs(id)
            )",
            )
            .await?;

        Ok(())
    }

    // ---- directory rows (seeding and auth lookups) ----

    pub async fn insert_company(
        &self,
        name: &str,
        taxi_license_number: Option<&str>,
        status: AccountStatus,
    ) -> Result<i64, DataManagerError> {
        let id = query_as::<_, (i64,)>(
            "INSERT INTO companies (id, name, taxi_license_number, status)
             VALUES (NULL, ?1, ?2, ?3) RETURNING id",
        )
        .bind(name)
        .bind(taxi_license_number)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }

    pub async fn insert_vehicle(
        &self,
        company_id: i64,
        license_plate: &str,
        brand: &str,
        model: &str,
        color: Option<&str>,
    ) -> Result<i64, DataManagerError> {
        let id = query_as::<_, (i64,)>(
            "INSERT INTO vehicles (id, company_id, license_plate, brand, model, color)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5) RETURNING id",
        )
        .bind(company_id)
        .bind(license_plate)
        .bind(brand)
        .bind(model)
        .bind(color)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }

    pub async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, DataManagerError> {
        let id = query_as::<_, (i64,)>(
            "INSERT INTO users (id, email, password_hash, role, created_at)
             VALUES (NULL, ?1, ?2, ?3, ?4) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }

    pub async fn insert_driver(
        &self,
        new: &NewDriver,
        now: DateTime<Utc>,
    ) -> Result<i64, DataManagerError> {
        let id = query_as::<_, (i64,)>(
            "INSERT INTO drivers (id, user_id, company_id, vehicle_id, first_name, last_name,
                                  phone, taxi_driver_license, status, is_online, created_at)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9) RETURNING id",
        )
        .bind(new.user_id)
        .bind(new.company_id)
        .bind(new.vehicle_id)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.phone)
        .bind(&new.taxi_driver_license)
        .bind(new.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, DataManagerError> {
        Ok(query_as::<_, UserAccount>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_driver(&self, driver_id: i64) -> Result<Driver, DataManagerError> {
        Ok(query_as::<_, Driver>("SELECT * FROM drivers WHERE id = ?1")
            .bind(driver_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn get_driver_by_user(&self, user_id: i64) -> Result<Option<Driver>, DataManagerError> {
        Ok(query_as::<_, Driver>("SELECT * FROM drivers WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_company(&self, company_id: i64) -> Result<Company, DataManagerError> {
        Ok(query_as::<_, Company>("SELECT * FROM companies WHERE id = ?1")
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn get_vehicle(&self, vehicle_id: i64) -> Result<Vehicle, DataManagerError> {
        Ok(query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = ?1")
            .bind(vehicle_id)
            .fetch_one(&self.pool)
            .await?)
    }

    // ---- presence ----

    pub async fn set_driver_presence(
        &self,
        driver_id: i64,
        online: bool,
        now: DateTime<Utc>,
    ) -> Result<(), DataManagerError> {
        query("UPDATE drivers SET is_online = ?1, last_location_update = ?2 WHERE id = ?3")
            .bind(online)
            .bind(now)
            .bind(driver_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Updates the driver's cached location and appends the immutable ping
    /// in one transaction. Concurrent pushes for the same driver resolve
    /// last-write-wins on the cached fields; every ping row survives.
    pub async fn record_location(
        &self,
        driver_id: i64,
        vehicle_id: Option<i64>,
        ping: &NewLocationPing,
        now: DateTime<Utc>,
    ) -> Result<LocationPing, DataManagerError> {
        let mut tx = self.pool.begin().await?;

        query(
            "UPDATE drivers SET current_latitude = ?1, current_longitude = ?2,
                                last_location_update = ?3
             WHERE id = ?4",
        )
        .bind(ping.latitude)
        .bind(ping.longitude)
        .bind(now)
        .bind(driver_id)
        .execute(&mut *tx)
        .await?;

        let id = query_as::<_, (i64,)>(
            "INSERT INTO location_updates (id, driver_id, vehicle_id, latitude, longitude,
                                           accuracy, speed, heading, altitude, created_at)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) RETURNING id",
        )
        .bind(driver_id)
        .bind(vehicle_id)
        .bind(ping.latitude)
        .bind(ping.longitude)
        .bind(ping.accuracy)
        .bind(ping.speed)
        .bind(ping.heading)
        .bind(ping.altitude)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LocationPing {
            id: id.0,
            driver_id,
            vehicle_id,
            latitude: ping.latitude,
            longitude: ping.longitude,
            accuracy: ping.accuracy,
            speed: ping.speed,
            heading: ping.heading,
            altitude: ping.altitude,
            created_at: now,
        })
    }

    pub async fn count_location_pings(&self, driver_id: i64) -> Result<i64, DataManagerError> {
        let count =
            query_as::<_, (i64,)>("SELECT COUNT(*) FROM location_updates WHERE driver_id = ?1")
                .bind(driver_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    /// Snapshot of drivers eligible for proximity queries: online, ACTIVE,
    /// located, and updated at or after `cutoff`.
    pub async fn list_available_drivers(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AvailableDriver>, DataManagerError> {
        let rows = query(
            "SELECT d.id, d.first_name, d.last_name, d.phone,
                    d.current_latitude, d.current_longitude, d.last_location_update,
                    v.id AS v_id, v.company_id AS v_company_id, v.license_plate,
                    v.brand, v.model, v.color,
                    c.id AS c_id, c.name AS c_name
             FROM drivers d
             JOIN companies c ON c.id = d.company_id
             LEFT JOIN vehicles v ON v.id = d.vehicle_id
             WHERE d.is_online = 1
               AND d.status = 'ACTIVE'
               AND d.current_latitude IS NOT NULL
               AND d.current_longitude IS NOT NULL
               AND d.last_location_update >= ?1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_available_driver).collect()
    }

    // ---- trip lifecycle ----

    /// Persists a trip log row. TRIP_START and TRIP_END additionally drive
    /// the per-vehicle open-trip state inside the same transaction: a
    /// second start on an open vehicle is a conflict, an end clears the
    /// state and either validates the supplied parent or adopts the open
    /// trip as its parent.
    pub async fn insert_trip_log(
        &self,
        new: &NewTripLog,
        now: DateTime<Utc>,
    ) -> Result<TripLogEvent, DataManagerError> {
        let mut tx = self.pool.begin().await?;

        let mut parent_id = new.parent_id;

        if let Some(vehicle_id) = new.vehicle_id {
            match new.log_type {
                TripLogKind::TripStart => {
                    let open = query_as::<_, (i64,)>(
                        "SELECT open_trip_log_id FROM vehicle_trip_state WHERE vehicle_id = ?1",
                    )
                    .bind(vehicle_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    if let Some((open_id,)) = open {
                        return Err(DataManagerError::TripConflict(open_id));
                    }
                }
                TripLogKind::TripEnd => {
                    let open = query_as::<_, (i64,)>(
                        "SELECT open_trip_log_id FROM vehicle_trip_state WHERE vehicle_id = ?1",
                    )
                    .bind(vehicle_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    match parent_id {
                        Some(pid) => {
                            let parent = query_as::<_, (String, i64, Option<i64>)>(
                                "SELECT log_type, driver_id, vehicle_id FROM trip_logs WHERE id = ?1",
                            )
                            .bind(pid)
                            .fetch_optional(&mut *tx)
                            .await?;

                            let valid = matches!(
                                parent,
                                Some((ref log_type, driver_id, log_vehicle_id))
                                    if log_type == TripLogKind::TripStart.as_str()
                                        && driver_id == new.driver_id
                                        && log_vehicle_id == Some(vehicle_id)
                            );
                            if !valid {
                                return Err(DataManagerError::InvalidParent(pid));
                            }
                        }
                        None => parent_id = open.map(|(open_id,)| open_id),
                    }

                    query("DELETE FROM vehicle_trip_state WHERE vehicle_id = ?1")
                        .bind(vehicle_id)
                        .execute(&mut *tx)
                        .await?;
                }
                _ => {}
            }
        }

        let log_details = new.log_details.as_ref().map(|value| value.to_string());

        let id = query_as::<_, (i64,)>(
            "INSERT INTO trip_logs (id, log_type, parent_id, company_id, vehicle_id, driver_id,
                                    user_id, start_latitude, start_longitude, start_address,
                                    end_latitude, end_longitude, end_address, distance, duration,
                                    final_price, tariff_used, trip_start_time, trip_end_time,
                                    log_details, start_reported, end_reported, report_error,
                                    created_at, updated_at)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, 0, 0, NULL, ?20, ?21) RETURNING id",
        )
        .bind(new.log_type.as_str())
        .bind(parent_id)
        .bind(new.company_id)
        .bind(new.vehicle_id)
        .bind(new.driver_id)
        .bind(new.user_id)
        .bind(new.start_latitude)
        .bind(new.start_longitude)
        .bind(&new.start_address)
        .bind(new.end_latitude)
        .bind(new.end_longitude)
        .bind(&new.end_address)
        .bind(new.distance)
        .bind(new.duration)
        .bind(new.final_price)
        .bind(&new.tariff_used)
        .bind(new.trip_start_time)
        .bind(new.trip_end_time)
        .bind(log_details)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if new.log_type == TripLogKind::TripStart {
            if let Some(vehicle_id) = new.vehicle_id {
                query("INSERT INTO vehicle_trip_state (vehicle_id, open_trip_log_id) VALUES (?1, ?2)")
                    .bind(vehicle_id)
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(TripLogEvent {
            id: id.0,
            log_type: new.log_type,
            parent_id,
            company_id: new.company_id,
            vehicle_id: new.vehicle_id,
            driver_id: new.driver_id,
            user_id: new.user_id,
            start_latitude: new.start_latitude,
            start_longitude: new.start_longitude,
            start_address: new.start_address.clone(),
            end_latitude: new.end_latitude,
            end_longitude: new.end_longitude,
            end_address: new.end_address.clone(),
            distance: new.distance,
            duration: new.duration,
            final_price: new.final_price,
            tariff_used: new.tariff_used.clone(),
            trip_start_time: new.trip_start_time,
            trip_end_time: new.trip_end_time,
            log_details: new.log_details.clone(),
            start_reported: false,
            end_reported: false,
            report_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_trip_log(&self, trip_log_id: i64) -> Result<TripLogEvent, DataManagerError> {
        Ok(query_as::<_, TripLogEvent>("SELECT * FROM trip_logs WHERE id = ?1")
            .bind(trip_log_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn list_trip_logs(
        &self,
        driver_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TripLogEvent>, DataManagerError> {
        Ok(query_as::<_, TripLogEvent>(
            "SELECT * FROM trip_logs WHERE driver_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(driver_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_trip_logs(&self, driver_id: i64) -> Result<i64, DataManagerError> {
        let count = query_as::<_, (i64,)>("SELECT COUNT(*) FROM trip_logs WHERE driver_id = ?1")
            .bind(driver_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    // ---- compliance auditing ----

    /// Marks the event reported for the given kind and clears any stale
    /// error text. Only the compliance reporter calls this.
    pub async fn mark_trip_reported(
        &self,
        trip_log_id: i64,
        kind: ReportKind,
        now: DateTime<Utc>,
    ) -> Result<(), DataManagerError> {
        let sql = match kind {
            ReportKind::TripStart => {
                "UPDATE trip_logs SET start_reported = 1, report_error = NULL, updated_at = ?1 WHERE id = ?2"
            }
            ReportKind::TripEnd => {
                "UPDATE trip_logs SET end_reported = 1, report_error = NULL, updated_at = ?1 WHERE id = ?2"
            }
        };

        query(sql).bind(now).bind(trip_log_id).execute(&self.pool).await?;

        Ok(())
    }

    pub async fn set_trip_report_error(
        &self,
        trip_log_id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DataManagerError> {
        query("UPDATE trip_logs SET report_error = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(error)
            .bind(now)
            .bind(trip_log_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_report_attempt(
        &self,
        attempt: &NewReportAttempt,
        now: DateTime<Utc>,
    ) -> Result<i64, DataManagerError> {
        let id = query_as::<_, (i64,)>(
            "INSERT INTO compliance_report_attempts (id, trip_log_id, request_kind, endpoint,
                                                     payload, response, status_code, success,
                                                     error_message, created_at)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) RETURNING id",
        )
        .bind(attempt.trip_log_id)
        .bind(attempt.request_kind.as_str())
        .bind(&attempt.endpoint)
        .bind(attempt.payload.to_string())
        .bind(&attempt.response)
        .bind(attempt.status_code)
        .bind(attempt.success)
        .bind(&attempt.error_message)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }

    pub async fn list_report_attempts(
        &self,
        trip_log_id: i64,
    ) -> Result<Vec<ComplianceReportAttempt>, DataManagerError> {
        Ok(query_as::<_, ComplianceReportAttempt>(
            "SELECT * FROM compliance_report_attempts WHERE trip_log_id = ?1 ORDER BY id",
        )
        .bind(trip_log_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

fn row_to_available_driver(row: &SqliteRow) -> Result<AvailableDriver, DataManagerError> {
    let vehicle_id: Option<i64> = row.try_get("v_id")?;
    let vehicle = match vehicle_id {
        Some(id) => Some(Vehicle {
            id,
            company_id: row.try_get("v_company_id")?,
            license_plate: row.try_get("license_plate")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            color: row.try_get("color")?,
        }),
        None => None,
    };

    Ok(AvailableDriver {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        latitude: row.try_get("current_latitude")?,
        longitude: row.try_get("current_longitude")?,
        last_location_update: row.try_get("last_location_update")?,
        vehicle,
        company: CompanySummary {
            id: row.try_get("c_id")?,
            name: row.try_get("c_name")?,
        },
    })
}
