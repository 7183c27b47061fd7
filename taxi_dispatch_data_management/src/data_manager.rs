use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taxi_dispatch_lib::{
    company::Company,
    compliance::ComplianceReportAttempt,
    driver::{AvailableDriver, Driver, NewDriver},
    location_ping::{LocationPing, NewLocationPing},
    status::AccountStatus,
    trip_log::{NewTripLog, TripLogEvent},
    user::UserAccount,
    vehicle::Vehicle,
};

use crate::{
    compliance::ComplianceReporter, database::db::DispatchDatabase, DataManagerError, DATA_DIR,
};

#[derive(Clone)]
pub struct DataManager {
    pub(crate) database: DispatchDatabase,
}

/// The public storage interface for the dispatch service.
impl DataManager {
    pub async fn start() -> Result<Self, DataManagerError> {
        // Create the data dir if it doesn't exist
        let root: PathBuf = project_root::get_project_root()
            .map_err(|err| DataManagerError::Setup(format!("failed to locate project root: {err}")))?;
        let data_dir = root.join(DATA_DIR);
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .map_err(|err| DataManagerError::Setup(format!("failed to create {data_dir:?}: {err}")))?;
        }

        let database = DispatchDatabase::connect().await?;

        Ok(DataManager { database })
    }

    /// Test variant backed by a private in-memory database.
    pub async fn start_in_memory() -> Result<Self, DataManagerError> {
        let database = DispatchDatabase::connect_in_memory().await?;
        Ok(DataManager { database })
    }

    /// Builds the compliance reporter against this manager's database.
    pub fn reporter(
        &self,
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<ComplianceReporter, DataManagerError> {
        ComplianceReporter::new(self.database.clone(), base_url, api_key, timeout)
    }

    // ---- directory ----

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, DataManagerError> {
        self.database.get_user_by_email(email).await
    }

    pub async fn get_driver(&self, driver_id: i64) -> Result<Driver, DataManagerError> {
        self.database.get_driver(driver_id).await
    }

    pub async fn get_driver_by_user(&self, user_id: i64) -> Result<Option<Driver>, DataManagerError> {
        self.database.get_driver_by_user(user_id).await
    }

    pub async fn get_company(&self, company_id: i64) -> Result<Company, DataManagerError> {
        self.database.get_company(company_id).await
    }

    pub async fn get_vehicle(&self, vehicle_id: i64) -> Result<Vehicle, DataManagerError> {
        self.database.get_vehicle(vehicle_id).await
    }

    pub async fn insert_company(
        &self,
        name: &str,
        taxi_license_number: Option<&str>,
        status: AccountStatus,
    ) -> Result<i64, DataManagerError> {
        self.database.insert_company(name, taxi_license_number, status).await
    }

    pub async fn insert_vehicle(
        &self,
        company_id: i64,
        license_plate: &str,
        brand: &str,
        model: &str,
        color: Option<&str>,
    ) -> Result<i64, DataManagerError> {
        self.database.insert_vehicle(company_id, license_plate, brand, model, color).await
    }

    pub async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<i64, DataManagerError> {
        self.database.insert_user(email, password_hash, role, Utc::now()).await
    }

    pub async fn insert_driver(&self, new: &NewDriver) -> Result<i64, DataManagerError> {
        self.database.insert_driver(new, Utc::now()).await
    }

    // ---- presence ----

    pub async fn set_driver_presence(&self, driver_id: i64, online: bool) -> Result<(), DataManagerError> {
        self.database.set_driver_presence(driver_id, online, Utc::now()).await
    }

    pub async fn record_location(
        &self,
        driver_id: i64,
        vehicle_id: Option<i64>,
        ping: &NewLocationPing,
    ) -> Result<LocationPing, DataManagerError> {
        self.database.record_location(driver_id, vehicle_id, ping, Utc::now()).await
    }

    pub async fn count_location_pings(&self, driver_id: i64) -> Result<i64, DataManagerError> {
        self.database.count_location_pings(driver_id).await
    }

    pub async fn list_available_drivers(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AvailableDriver>, DataManagerError> {
        self.database.list_available_drivers(cutoff).await
    }

    // ---- trip lifecycle ----

    pub async fn record_trip_event(&self, new: &NewTripLog) -> Result<TripLogEvent, DataManagerError> {
        self.database.insert_trip_log(new, Utc::now()).await
    }

    pub async fn get_trip_log(&self, trip_log_id: i64) -> Result<TripLogEvent, DataManagerError> {
        self.database.get_trip_log(trip_log_id).await
    }

    /// Page of the driver's events, newest first, plus the total count.
    pub async fn list_trip_events(
        &self,
        driver_id: i64,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<TripLogEvent>, i64), DataManagerError> {
        let offset = (page - 1) * limit;
        let events = self.database.list_trip_logs(driver_id, limit, offset).await?;
        let total = self.database.count_trip_logs(driver_id).await?;
        Ok((events, total))
    }

    pub async fn list_report_attempts(
        &self,
        trip_log_id: i64,
    ) -> Result<Vec<ComplianceReportAttempt>, DataManagerError> {
        self.database.list_report_attempts(trip_log_id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use taxi_dispatch_lib::trip_log::TripLogKind;

    use super::*;

    struct Fixture {
        dm: DataManager,
        company_id: i64,
        vehicle_id: i64,
        user_id: i64,
        driver_id: i64,
    }

    async fn fixture() -> Fixture {
        let dm = DataManager::start_in_memory().await.unwrap();

        let company_id = dm.insert_company("Brussels Cabs", Some("BC-001"), AccountStatus::Active).await.unwrap();
        let vehicle_id = dm.insert_vehicle(company_id, "1-ABC-123", "Toyota", "Prius", Some("black")).await.unwrap();
        let user_id = dm.insert_user("jan@cabs.test", "not-a-real-hash", "DRIVER").await.unwrap();
        let driver_id = dm
            .insert_driver(&NewDriver {
                user_id,
                company_id,
                vehicle_id: Some(vehicle_id),
                first_name: "Jan".into(),
                last_name: "Peeters".into(),
                phone: "+32470000001".into(),
                taxi_driver_license: "TDL-1".into(),
                status: AccountStatus::Active,
            })
            .await
            .unwrap();

        Fixture { dm, company_id, vehicle_id, user_id, driver_id }
    }

    fn bare(fx: &Fixture, kind: TripLogKind) -> NewTripLog {
        NewTripLog::bare(kind, fx.company_id, Some(fx.vehicle_id), fx.driver_id, fx.user_id)
    }

    #[tokio::test]
    async fn location_push_updates_cache_and_appends_ping() {
        let fx = fixture().await;
        let dm = &fx.dm;

        dm.set_driver_presence(fx.driver_id, true).await.unwrap();

        let first = NewLocationPing { latitude: 50.8503, longitude: 4.3517, ..Default::default() };
        let second = NewLocationPing { latitude: 50.8466, longitude: 4.3528, accuracy: Some(5.0), ..Default::default() };

        dm.record_location(fx.driver_id, Some(fx.vehicle_id), &first).await.unwrap();
        let ping = dm.record_location(fx.driver_id, Some(fx.vehicle_id), &second).await.unwrap();
        assert!(ping.id > 0);

        // Cached fields are last-write-wins; both pings survive.
        let driver = dm.get_driver(fx.driver_id).await.unwrap();
        assert_eq!(driver.current_latitude, Some(50.8466));
        assert_eq!(driver.current_longitude, Some(4.3528));
        assert!(driver.last_location_update.is_some());
        assert_eq!(dm.count_location_pings(fx.driver_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn nearby_snapshot_excludes_offline_and_stale_drivers() {
        let fx = fixture().await;
        let dm = &fx.dm;

        let cutoff = Utc::now() - Duration::minutes(5);

        // Located but offline: invisible.
        let ping = NewLocationPing { latitude: 50.85, longitude: 4.35, ..Default::default() };
        dm.record_location(fx.driver_id, Some(fx.vehicle_id), &ping).await.unwrap();
        assert!(dm.list_available_drivers(cutoff).await.unwrap().is_empty());

        // Online and fresh: visible, with vehicle and company joined.
        dm.set_driver_presence(fx.driver_id, true).await.unwrap();
        dm.record_location(fx.driver_id, Some(fx.vehicle_id), &ping).await.unwrap();
        let available = dm.list_available_drivers(cutoff).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, fx.driver_id);
        assert_eq!(available[0].company.name, "Brussels Cabs");
        assert_eq!(available[0].vehicle.as_ref().unwrap().license_plate, "1-ABC-123");

        // A query window that postdates the last update: stale, invisible.
        let future_cutoff = Utc::now() + Duration::minutes(1);
        assert!(dm.list_available_drivers(future_cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_start_on_open_vehicle_conflicts() {
        let fx = fixture().await;
        let dm = &fx.dm;

        let start = dm.record_trip_event(&bare(&fx, TripLogKind::TripStart)).await.unwrap();

        let err = dm.record_trip_event(&bare(&fx, TripLogKind::TripStart)).await.unwrap_err();
        match err {
            DataManagerError::TripConflict(open_id) => assert_eq!(open_id, start.id),
            other => panic!("expected TripConflict, got {other:?}"),
        }

        // Ending the trip frees the vehicle for a new start.
        let mut end = bare(&fx, TripLogKind::TripEnd);
        end.parent_id = Some(start.id);
        dm.record_trip_event(&end).await.unwrap();
        dm.record_trip_event(&bare(&fx, TripLogKind::TripStart)).await.unwrap();
    }

    #[tokio::test]
    async fn end_adopts_open_trip_when_parent_missing() {
        let fx = fixture().await;
        let dm = &fx.dm;

        let start = dm.record_trip_event(&bare(&fx, TripLogKind::TripStart)).await.unwrap();
        let end = dm.record_trip_event(&bare(&fx, TripLogKind::TripEnd)).await.unwrap();

        assert_eq!(end.parent_id, Some(start.id));
        let stored = dm.get_trip_log(end.id).await.unwrap();
        assert_eq!(stored.parent_id, Some(start.id));
    }

    #[tokio::test]
    async fn end_rejects_parent_that_is_not_a_matching_start() {
        let fx = fixture().await;
        let dm = &fx.dm;

        let login = dm.record_trip_event(&bare(&fx, TripLogKind::DriverLogin)).await.unwrap();

        let mut end = bare(&fx, TripLogKind::TripEnd);
        end.parent_id = Some(login.id);
        let err = dm.record_trip_event(&end).await.unwrap_err();
        assert!(matches!(err, DataManagerError::InvalidParent(id) if id == login.id));

        // Unknown ids are rejected the same way.
        let mut end = bare(&fx, TripLogKind::TripEnd);
        end.parent_id = Some(9999);
        let err = dm.record_trip_event(&end).await.unwrap_err();
        assert!(matches!(err, DataManagerError::InvalidParent(9999)));
    }

    #[tokio::test]
    async fn events_list_newest_first_with_total() {
        let fx = fixture().await;
        let dm = &fx.dm;

        let start = dm.record_trip_event(&bare(&fx, TripLogKind::TripStart)).await.unwrap();
        let mut end = bare(&fx, TripLogKind::TripEnd);
        end.parent_id = Some(start.id);
        end.distance = Some(12.5);
        end.final_price = Some(25.50);
        let end = dm.record_trip_event(&end).await.unwrap();

        let (events, total) = dm.list_trip_events(fx.driver_id, 1, 50).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, end.id);
        assert_eq!(events[1].id, start.id);
        assert_eq!(events[0].distance, Some(12.5));
        assert_eq!(events[0].final_price, Some(25.50));

        let (page2, total) = dm.list_trip_events(fx.driver_id, 2, 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].id, start.id);
    }
}
