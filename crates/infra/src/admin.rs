//! Administrative flows that sit outside the public order lifecycle.

use tracing::{info, instrument};

use courier_core::{Clock, IdGenerator, OrderId};
use courier_orders::{Operation, OrderError, OrderLifecycleEngine, OrderRepository, OrderResult};

/// Permanently remove an order, its history and its QR artifact.
///
/// Only orders that pass `is_available_for_delete` (not soft-deleted, status
/// in the deletable set) are removed.
#[instrument(skip_all, fields(order_id = %id))]
pub async fn purge_order<R, C, G>(engine: &OrderLifecycleEngine<R, C, G>, id: OrderId) -> OrderResult<()>
where
    R: OrderRepository,
    C: Clock,
    G: IdGenerator,
{
    engine.is_available_for_delete(id).await?;

    engine
        .repository()
        .delete_order(id)
        .await
        .map_err(|err| OrderError::from_repository(Operation::PurgeOrder, id, err))?;

    info!("order purged");
    Ok(())
}
