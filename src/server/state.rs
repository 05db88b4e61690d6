use std::sync::Arc;

use crate::config::Config;
use crate::location::{LocationAcquirer, NetworkSensor, PositionSensor, Resolvers};

/// Shared application state. Built once, in order: config, resolvers,
/// sensor, acquirer.
pub struct AppState {
    pub config: Config,
    pub resolvers: Resolvers,
    pub acquirer: LocationAcquirer,
}

impl AppState {
    pub fn new(config: Config, offline: bool) -> Self {
        let resolvers = Resolvers::from_config(&config, offline);
        let sensor = Arc::new(NetworkSensor::new(
            &config.device.ip_endpoint,
            &config.geocoder.user_agent,
        ));
        Self::with_parts(config, resolvers, sensor)
    }

    pub fn with_parts(
        config: Config,
        resolvers: Resolvers,
        sensor: Arc<dyn PositionSensor>,
    ) -> Self {
        let acquirer = LocationAcquirer::new(sensor, config.device.acquirer());
        Self {
            config,
            resolvers,
            acquirer,
        }
    }
}
