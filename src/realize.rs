//! Realization: committing a proto record's data to a concrete entity.
//!
//! If the proto has a selected entity, its raw fields are applied to that
//! entity as a validated update; otherwise a new entity is created. Either
//! the whole update validates and commits, or none of it does: the
//! validator produces the complete post-commit field map and the repository
//! receives it in a single call. Domain validation failures are recorded on
//! the proto and never raised past this boundary, so batch callers can keep
//! going; repository failures propagate.

use tracing::debug;

use crate::entity::EntityId;
use crate::error::{EngineResult, ValidationError};
use crate::field::FieldMap;
use crate::fingerprint::fingerprint;
use crate::proto::ProtoRecord;
use crate::registry::KindProfile;
use crate::repository::{EntityRepository, RepositoryError};

/// Outcome of a realization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Realization {
    /// The data was committed to this entity.
    Committed(EntityId),
    /// Domain validation rejected the data; the failure is recorded on the
    /// proto record.
    Invalid,
}

/// Commits the proto's raw fields to its selected entity, or to a new one.
///
/// On success the proto's transient failure is cleared and, on the create
/// path, the new entity becomes the proto's selection. The committed
/// entity's cached fingerprint is refreshed so it stays a pure function of
/// the stored fields.
///
/// # Errors
///
/// Repository failures, including a natural-key [`RepositoryError::DuplicateKey`]
/// on the create path — the signal that a concurrent caller realized the
/// same entity first and this proto should be re-discovered.
pub fn realize(
    proto: &mut ProtoRecord,
    profile: &KindProfile,
    repo: &dyn EntityRepository,
) -> EngineResult<Realization> {
    let existing = match proto.selected_entity_id {
        Some(entity_id) => {
            let record = repo
                .get(entity_id)?
                .ok_or(RepositoryError::EntityNotFound(entity_id))?;
            Some((entity_id, record.fields))
        }
        None => None,
    };

    let validated = profile
        .validator_ref()
        .validate_and_apply(existing.as_ref().map(|(_, fields)| fields), &proto.raw_fields);

    let fields = match validated {
        Ok(fields) => fields,
        Err(err) => {
            record_failure(proto, &err);
            return Ok(Realization::Invalid);
        }
    };

    let entity_id = match existing {
        Some((entity_id, _)) => {
            repo.update(entity_id, fields.clone())?;
            entity_id
        }
        None => {
            let entity_id = repo.create(fields.clone())?;
            proto.select(Some(entity_id));
            entity_id
        }
    };

    refresh_fingerprint(profile, repo, entity_id, &fields)?;
    proto.clear_failure();
    debug!(proto = %proto.id, %entity_id, "realized proto record");
    Ok(Realization::Committed(entity_id))
}

fn record_failure(proto: &mut ProtoRecord, err: &ValidationError) {
    let trace: Vec<String> = err
        .errors
        .iter()
        .map(|e| {
            if e.field.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.field, e.message)
            }
        })
        .collect();
    proto.assign_failure(err.to_string(), Some(trace.join("\n")));
}

fn refresh_fingerprint(
    profile: &KindProfile,
    repo: &dyn EntityRepository,
    entity_id: EntityId,
    fields: &FieldMap,
) -> EngineResult<()> {
    match profile.pipeline().normalize(fields) {
        Ok(normalized) => repo.upsert_fingerprint(entity_id, fingerprint(&normalized))?,
        Err(err) => {
            // A committed entity without the profiled field simply has no
            // fingerprint to cache; discovery will keep skipping it.
            debug!(%entity_id, %err, "committed entity has no normalizable value");
        }
    }
    Ok(())
}
