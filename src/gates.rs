use std::collections::HashMap;

use crate::api::Backend;
use crate::error::ApiError;
use crate::flags::FlagKeys;
use crate::types::TaskRecord;

/// Fetch a product's task records for one phase, keyed by task id.
///
/// The map shape is what the engine caches: one record per task once any
/// state has been set, absent entries meaning "not completed, not validated".
pub async fn phase_records(
    backend: &impl Backend,
    product_id: i64,
    phase_id: i64,
) -> Result<HashMap<i64, TaskRecord>, ApiError> {
    let records = backend.list_task_records(product_id, phase_id).await?;
    Ok(records.into_iter().map(|r| (r.task_id, r)).collect())
}

/// Number of the phase's tasks lacking an affirmative completion record.
/// Informational only; never a gate by itself.
pub async fn count_pending_tasks(
    backend: &impl Backend,
    keys: &FlagKeys,
    product_id: i64,
    phase_id: i64,
) -> Result<usize, ApiError> {
    let tasks = backend.list_phase_tasks(phase_id).await?;
    if tasks.is_empty() {
        return Ok(0);
    }
    let records = phase_records(backend, product_id, phase_id).await?;
    Ok(tasks
        .iter()
        .filter(|task| !keys.is_completed(records.get(&task.id)))
        .count())
}

/// Completion gate: true iff the phase has no tasks, or every task joins to
/// a record whose completion flag is affirmative. Holds regardless of record
/// insertion order (the join is by task id).
pub async fn is_phase_fully_completed(
    backend: &impl Backend,
    keys: &FlagKeys,
    product_id: i64,
    phase_id: i64,
) -> Result<bool, ApiError> {
    Ok(count_pending_tasks(backend, keys, product_id, phase_id).await? == 0)
}

/// Supervisor-validation gate: true iff the product has at least one record
/// for the phase AND every record's validation flag is affirmative.
///
/// Never vacuously true: zero records is false even for a phase with zero
/// tasks, unlike the completion gate.
pub async fn is_phase_validated(
    backend: &impl Backend,
    keys: &FlagKeys,
    product_id: i64,
    phase_id: i64,
) -> Result<bool, ApiError> {
    let records = backend.list_task_records(product_id, phase_id).await?;
    Ok(!records.is_empty() && records.iter().all(|r| keys.is_validated(Some(r))))
}

/// Locally-cached variant of the validation gate, for fast feedback only.
/// Gating decisions must go through `reconcile_validation` instead.
pub fn cached_validation(cache: &HashMap<i64, TaskRecord>, keys: &FlagKeys) -> bool {
    !cache.is_empty() && cache.values().all(|r| keys.is_validated(Some(r)))
}

/// Re-check the validation gate remotely and replace the cache with the
/// fresh records. The remote result always wins over the cached value.
pub async fn reconcile_validation(
    backend: &impl Backend,
    keys: &FlagKeys,
    product_id: i64,
    phase_id: i64,
    cache: &mut HashMap<i64, TaskRecord>,
) -> Result<bool, ApiError> {
    let fresh = phase_records(backend, product_id, phase_id).await?;
    *cache = fresh;
    Ok(cached_validation(cache, keys))
}
