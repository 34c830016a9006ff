//! Single-use connections without a pool

use std::sync::{Arc, Weak};

use dbpool_core::{Credentials, DatabaseTarget, DriverManager, Result};

use super::{HandleState, PooledConnection};
use crate::pool::{PoolCounters, open_native};

/// Open a single-use handle for an ad-hoc endpoint.
///
/// No pool is involved: the handle is destroyed when closed and can never
/// be recreated. The driver is registered and the open retried once when
/// the first attempt fails.
#[tracing::instrument(skip(drivers, url, password), fields(driver = %driver_id))]
pub async fn connect_unpooled(
    drivers: &dyn DriverManager,
    driver_id: &str,
    url: &str,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<PooledConnection> {
    let mut target = DatabaseTarget::new("unpooled", driver_id, url);
    target.user = user.map(str::to_string);
    target.password = password.map(str::to_string);

    let credentials = Credentials::from_target(&target);
    let native = open_native(drivers, &target, &credentials).await?;
    let state = HandleState::open(
        native,
        false,
        Weak::new(),
        Arc::new(target),
        Arc::new(PoolCounters::default()),
    )
    .await?;
    Ok(PooledConnection::fresh(state))
}
