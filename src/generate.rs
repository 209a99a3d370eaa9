//! Association generation.
//!
//! The match phase runs each rule over the whole pool independently: every
//! rule owns its pending associations, so rules can be matched in parallel.
//! The reduce phase then finalizes, prunes, merges and resequences the
//! combined output on the calling thread.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use tracing::debug;

use crate::association::Association;
use crate::config::PipelineConfig;
use crate::error::{AsnError, AsnResult};
use crate::item::Item;
use crate::merge::Merger;
use crate::pending::PendingAssociation;
use crate::prune::{prune_duplicate_products, resequence};
use crate::rule::{Rule, RuleSet};

/// Generate associations from a pool.
///
/// Output is deterministic for a given pool, rule set and configuration,
/// whatever the number of workers.
pub fn generate(
    pool: &[Item],
    rules: &RuleSet,
    config: &PipelineConfig,
) -> AsnResult<Vec<Association>> {
    let config = config.clone().validate()?;

    let per_rule = if config.workers > 1 && rules.len() > 1 {
        match_parallel(pool, rules, config.workers, config.reprocess)?
    } else {
        rules
            .iter()
            .map(|rule| match_rule(pool, rule, config.reprocess))
            .collect()
    };

    let finalized: Vec<Association> = per_rule
        .into_iter()
        .flatten()
        .flat_map(PendingAssociation::finalize)
        .collect();
    let finalized_count = finalized.len();

    let mut asns = prune_duplicate_products(finalized);
    if config.merge {
        asns = Merger::new(config.role_conflict).merge(asns)?;
    }
    resequence(&mut asns);

    debug!(
        items = pool.len(),
        rules = rules.len(),
        finalized = finalized_count,
        output = asns.len(),
        "generated associations"
    );
    Ok(asns)
}

/// Run one rule over the pool, returning its pending associations.
///
/// Each item is offered, per candidate, to every pending association of that
/// candidate. If none accepts it a new association is opened. Items whose
/// match asked for reprocessing are offered once more, after the whole pool
/// has been seen, to the associations that do not already hold them.
#[must_use]
pub fn match_rule(pool: &[Item], rule: &Arc<Rule>, reprocess: bool) -> Vec<PendingAssociation> {
    let mut pending: Vec<PendingAssociation> = Vec::new();
    let mut deferred = Vec::new();

    for item in pool {
        for acid in item.candidates() {
            let mut matched = false;
            let mut requeue = false;
            for asn in pending.iter_mut().filter(|asn| asn.acid() == &acid) {
                let outcome = asn.add(item);
                matched |= outcome.matched;
                requeue |= outcome.reprocess;
            }

            if !matched {
                let mut asn = PendingAssociation::new(Arc::clone(rule), acid.clone());
                let outcome = asn.add(item);
                if outcome.matched {
                    requeue |= outcome.reprocess;
                    pending.push(asn);
                }
            }

            if requeue {
                deferred.push((item, acid));
            }
        }
    }

    if reprocess && !deferred.is_empty() {
        debug!(rule = rule.name(), items = deferred.len(), "reprocessing deferred items");
        for (item, acid) in deferred {
            for asn in pending
                .iter_mut()
                .filter(|asn| asn.acid() == &acid && !asn.holds(item))
            {
                asn.add(item);
            }
        }
    }

    debug!(rule = rule.name(), associations = pending.len(), "rule matched");
    pending
}

/// Match rules on `workers` threads, returning results in rule order.
fn match_parallel(
    pool: &[Item],
    rules: &RuleSet,
    workers: usize,
    reprocess: bool,
) -> AsnResult<Vec<Vec<PendingAssociation>>> {
    let rules: Vec<&Arc<Rule>> = rules.iter().collect();
    let workers = workers.clamp(1, rules.len().max(1));
    let (tx, rx) = bounded::<(usize, Vec<PendingAssociation>)>(rules.len());

    thread::scope(|scope| -> AsnResult<()> {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let tx = tx.clone();
            let rules = &rules;
            let handle = thread::Builder::new()
                .name(format!("asnforge-match-{worker}"))
                .spawn_scoped(scope, move || {
                    for idx in (worker..rules.len()).step_by(workers) {
                        let pending = match_rule(pool, rules[idx], reprocess);
                        if tx.send((idx, pending)).is_err() {
                            break;
                        }
                    }
                })?;
            handles.push(handle);
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| AsnError::internal("match worker panicked"))?;
        }
        Ok(())
    })?;
    drop(tx);

    let mut results: Vec<Option<Vec<PendingAssociation>>> = rules.iter().map(|_| None).collect();
    for (idx, pending) in rx.try_iter() {
        results[idx] = Some(pending);
    }
    results
        .into_iter()
        .enumerate()
        .map(|(idx, pending)| {
            pending.ok_or_else(|| AsnError::internal(format!("no match result for rule #{idx}")))
        })
        .collect()
}

/// File-stem names of the associations, in order.
#[must_use]
pub fn output_names(asns: &[Association], config: &PipelineConfig) -> Vec<String> {
    asns.iter()
        .map(|asn| asn.asn_name(config.version_id.as_deref()))
        .collect()
}
