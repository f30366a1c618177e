use tracing::debug;

use super::host::HostEngine;
use super::session::GttSession;
use crate::core::{RelationId, Result};
use crate::planner::{PermissionInfo, RangeTableEntry};

/// Replaces references to template placeholders with this session's
/// materializations, materializing on first use.
///
/// The primary relation is handled first, then every other range table entry.
/// Permission entries are kept in step with the range table, and each lock the
/// statement took on a placeholder moves to the materialization. Returns the
/// number of entries rewritten.
pub fn reroute(
    session: &mut GttSession,
    host: &mut dyn HostEngine,
    rtable: &mut [RangeTableEntry],
    permissions: &mut [PermissionInfo],
    primary: Option<usize>,
) -> Result<usize> {
    let mut order: Vec<usize> = primary.into_iter().filter(|&i| i < rtable.len()).collect();
    order.extend((0..rtable.len()).filter(|i| Some(*i) != primary));

    let mut rewritten = 0;
    for index in order {
        let old = rtable[index].relid;
        let Some(template) = placeholder_template(session, host, old)? else {
            continue;
        };
        let new = session.ensure_materialized(host, &template)?;
        if new == old {
            continue;
        }

        for rte in rtable.iter_mut().filter(|rte| rte.relid == old) {
            host.lock_relation(new, rte.lock_mode)?;
            host.unlock_relation(old, rte.lock_mode);
            rte.relid = new;
            rewritten += 1;
        }
        for permission in permissions.iter_mut().filter(|p| p.relid == old) {
            permission.relid = new;
        }
        debug!(template = %template, from = %old, to = %new, "rerouting");
    }
    Ok(rewritten)
}

/// Template whose placeholder is `id`. Catalog relations and materializations never qualify.
fn placeholder_template(session: &mut GttSession, host: &dyn HostEngine, id: RelationId) -> Result<Option<String>> {
    if host.relation(id).is_none_or(|info| info.is_catalog) {
        return Ok(None);
    }
    let Some(name) = session.template_for_relation(host, id)? else {
        return Ok(None);
    };
    let is_placeholder = session
        .cache()
        .lookup(&name)
        .is_some_and(|b| b.template.placeholder_id == id);
    Ok(is_placeholder.then_some(name))
}
