use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::{self, queries};
use crate::models::EngineSettings;
use crate::services::holidays::HolidayApi;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub holiday_api: Box<dyn HolidayApi>,
}

impl AppState {
    /// Current settings snapshot; admin edits apply to the next request.
    pub fn engine_settings(&self) -> anyhow::Result<EngineSettings> {
        let conn = db::lock(&self.db)?;
        queries::load_engine_settings(&conn)
    }
}
