//! The inheritance propagator.
//!
//! `perform_inheritance` recomputes every non-overridden property value in
//! the repository from its inheritance sources and is idempotent: a second
//! pass without intervening edits changes nothing.
//!
//! The pass is explicit and batched. It is not triggered per edit because
//! its cost grows with repository size; callers run it once after a set of
//! edits (the editing session takes `&mut Repository`, which serializes the
//! pass against all structural mutations).

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use stratum_model::{
    ArrayInstance, Arity, CategoryInstance, CategoryInstantiator, GraphRelation, ModelError,
    ModelResult, PropertyInstance, PropertyValue, Repository,
};

// ============================================================================
// Pass options and report
// ============================================================================

/// Called after each processed element with `(processed, total)`.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Knobs for one propagation pass.
#[derive(Default)]
pub struct PassOptions {
    /// Cooperative cancellation, checked once per element. A cancelled pass
    /// leaves already-processed elements resolved and the rest untouched;
    /// since the pass is idempotent it can simply be rerun to completion.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Incremental progress reporting for long passes.
    pub progress: Option<ProgressFn>,
}

/// A category instance skipped during a pass because subject and source
/// disagreed on shape.
#[derive(Debug, Clone)]
pub struct SchemaMismatchNote {
    pub element: Uuid,
    pub category: Uuid,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct InheritanceReport {
    pub elements_processed: usize,
    /// Number of distinct inheritance depths encountered.
    pub ranks: usize,
    pub mismatches: Vec<SchemaMismatchNote>,
    pub cancelled: bool,
}

// ============================================================================
// The pass
// ============================================================================

pub fn perform_inheritance(repo: &mut Repository) -> ModelResult<InheritanceReport> {
    perform_inheritance_with(repo, &PassOptions::default())
}

pub fn perform_inheritance_with(
    repo: &mut Repository,
    options: &PassOptions,
) -> ModelResult<InheritanceReport> {
    // Snapshot the inheritance graph and re-verify it before any mutation.
    // Edits may have reached stored state without going through the graph
    // API, so a cycle here aborts the whole pass with the repository
    // untouched.
    let supers_of: BTreeMap<Uuid, Vec<Uuid>> = repo
        .elements()
        .map(|e| (e.uuid, e.supers.clone()))
        .collect();
    for sources in supers_of.values() {
        for source in sources {
            if !repo.contains(*source) {
                return Err(ModelError::DanglingReference(*source));
            }
        }
    }
    let order = rank_order(&supers_of)?;
    let total = order.len();
    let ranks = order.last().map_or(0, |(rank, _)| *rank as usize + 1);

    let schemas = repo.active_schemas.clone();
    let instantiator = CategoryInstantiator::new(&schemas);
    let mut report = InheritanceReport {
        ranks,
        ..InheritanceReport::default()
    };

    let mut current_rank = 0u32;
    for (rank, uuid) in order {
        if let Some(cancel) = &options.cancel {
            if cancel.load(Ordering::Relaxed) {
                tracing::info!(
                    processed = report.elements_processed,
                    "inheritance pass cancelled"
                );
                report.cancelled = true;
                break;
            }
        }
        if rank != current_rank {
            tracing::debug!(rank, "starting inheritance rank");
            current_rank = rank;
        }

        // First edge wins: for each category of the subject, the first
        // source in insertion order that carries an instance of the same
        // schema provides the values. Sources at lower ranks are already
        // resolved, so their stored values are their resolved values.
        let plan: Vec<(usize, CategoryInstance)> = {
            let subject = repo.element(uuid)?;
            if subject.supers.is_empty() {
                Vec::new()
            } else {
                subject
                    .categories
                    .iter()
                    .enumerate()
                    .filter_map(|(index, category)| {
                        subject.supers.iter().find_map(|source| {
                            repo.element(*source)
                                .ok()
                                .and_then(|el| el.category(&category.schema))
                                .map(|found| (index, found.clone()))
                        })
                    })
                    .collect()
            }
        };

        if !plan.is_empty() {
            let subject = repo.element_mut(uuid)?;
            for (index, source) in plan {
                let target = &mut subject.categories[index];
                // Shape compatibility is checked before any value is copied,
                // so a mismatching category instance is skipped whole.
                let outcome = check_category(target, &source)
                    .and_then(|()| copy_category(target, &source, &instantiator));
                if let Err(err) = outcome {
                    tracing::warn!(
                        element = %uuid,
                        category = %target.uuid,
                        error = %err,
                        "category skipped during inheritance"
                    );
                    report.mismatches.push(SchemaMismatchNote {
                        element: uuid,
                        category: target.uuid,
                        detail: err.to_string(),
                    });
                }
            }
        }
        report.elements_processed += 1;
        if let Some(progress) = &options.progress {
            progress(report.elements_processed, total);
        }
    }

    tracing::info!(
        elements = report.elements_processed,
        ranks = report.ranks,
        mismatches = report.mismatches.len(),
        cancelled = report.cancelled,
        "inheritance pass finished"
    );
    Ok(report)
}

// ============================================================================
// Topological order by inheritance depth
// ============================================================================

/// Kahn layering over the inheritance relation. Elements without sources are
/// rank 0; every other element ranks one above its deepest source. Returns
/// `(rank, uuid)` pairs sorted by rank (uuid as deterministic tie-break), or
/// `CycleError` when some elements can never be resolved.
fn rank_order(supers_of: &BTreeMap<Uuid, Vec<Uuid>>) -> ModelResult<Vec<(u32, Uuid)>> {
    let mut indegree: BTreeMap<Uuid, usize> =
        supers_of.iter().map(|(u, s)| (*u, s.len())).collect();
    let mut dependents: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for (subject, sources) in supers_of {
        for source in sources {
            dependents.entry(*source).or_default().push(*subject);
        }
    }

    let mut rank: BTreeMap<Uuid, u32> = BTreeMap::new();
    let mut queue: VecDeque<Uuid> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(uuid, _)| *uuid)
        .collect();
    for uuid in &queue {
        rank.insert(*uuid, 0);
    }

    let mut out = Vec::with_capacity(supers_of.len());
    while let Some(uuid) = queue.pop_front() {
        let own_rank = rank[&uuid];
        out.push((own_rank, uuid));
        if let Some(deps) = dependents.get(&uuid) {
            for dep in deps {
                let entry = rank.entry(*dep).or_insert(0);
                *entry = (*entry).max(own_rank + 1);
                let degree = indegree.get_mut(dep).expect("dependent is a known element");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dep);
                }
            }
        }
    }

    if out.len() != supers_of.len() {
        // Some element still waits on an unprocessed source: that pair sits
        // on a cycle.
        let (subject, sources) = supers_of
            .iter()
            .find(|(uuid, _)| indegree[*uuid] > 0)
            .expect("unprocessed element exists");
        let blocker = sources
            .iter()
            .find(|s| indegree.get(*s).is_some_and(|d| *d > 0))
            .copied()
            .unwrap_or(*subject);
        return Err(ModelError::Cycle {
            relation: GraphRelation::Inheritance,
            subject: *subject,
            other: blocker,
        });
    }

    out.sort_by_key(|(rank, uuid)| (*rank, *uuid));
    Ok(out)
}

// ============================================================================
// Override-aware value copy
// ============================================================================

fn mismatch(subject: Uuid, detail: String) -> ModelError {
    ModelError::SchemaMismatch { subject, detail }
}

fn check_category(subject: &CategoryInstance, source: &CategoryInstance) -> ModelResult<()> {
    if subject.schema != source.schema {
        return Err(mismatch(
            subject.uuid,
            format!(
                "inheriting `{}` from `{}`",
                subject.schema, source.schema
            ),
        ));
    }
    if subject.properties.len() != source.properties.len() {
        return Err(mismatch(
            subject.uuid,
            format!(
                "{} properties vs {} in source",
                subject.properties.len(),
                source.properties.len()
            ),
        ));
    }
    for (sub, src) in subject.properties.iter().zip(&source.properties) {
        if sub.name != src.name {
            return Err(mismatch(
                sub.uuid,
                format!("property `{}` vs `{}` in source", sub.name, src.name),
            ));
        }
        check_property(sub, src)?;
    }
    Ok(())
}

fn check_property(subject: &PropertyInstance, source: &PropertyInstance) -> ModelResult<()> {
    if subject.overridden {
        // Overridden subtrees are frozen; their shape no longer matters to
        // this pass.
        return Ok(());
    }
    match (&subject.value, &source.value) {
        (
            PropertyValue::Value { kind: a, .. },
            PropertyValue::Value { kind: b, .. },
        ) => {
            if a != b {
                return Err(mismatch(subject.uuid, format!("{a} value vs {b} in source")));
            }
            Ok(())
        }
        (PropertyValue::Reference { .. }, PropertyValue::Reference { .. }) => Ok(()),
        (
            PropertyValue::Composition { instance: a },
            PropertyValue::Composition { instance: b },
        ) => check_category(a, b),
        (PropertyValue::Array { array: a }, PropertyValue::Array { array: b }) => {
            check_array(subject, a, b)
        }
        (a, b) => Err(mismatch(
            subject.uuid,
            format!("{} vs {} in source", a.describe(), b.describe()),
        )),
    }
}

fn check_array(
    owner: &PropertyInstance,
    subject: &ArrayInstance,
    source: &ArrayInstance,
) -> ModelResult<()> {
    match (subject.arity(), source.arity()) {
        (Arity::Fixed { size: n }, Arity::Fixed { size: m }) => {
            if n != m {
                return Err(mismatch(
                    owner.uuid,
                    format!("fixed array of {n} vs {m} in source"),
                ));
            }
            for (sub, src) in subject.iter().zip(source.iter()) {
                check_property(sub, src)?;
            }
            Ok(())
        }
        (Arity::Dynamic, Arity::Dynamic) => {
            // Items beyond the common prefix are replaced by fresh
            // instances, which always match.
            for (sub, src) in subject.iter().zip(source.iter()) {
                check_property(sub, src)?;
            }
            Ok(())
        }
        (a, b) => Err(mismatch(
            owner.uuid,
            format!("array arity {a:?} vs {b:?} in source"),
        )),
    }
}

fn copy_category(
    subject: &mut CategoryInstance,
    source: &CategoryInstance,
    instantiator: &CategoryInstantiator<'_>,
) -> ModelResult<()> {
    for (sub, src) in subject.properties.iter_mut().zip(&source.properties) {
        copy_property(sub, src, instantiator)?;
    }
    Ok(())
}

fn copy_property(
    subject: &mut PropertyInstance,
    source: &PropertyInstance,
    instantiator: &CategoryInstantiator<'_>,
) -> ModelResult<()> {
    if subject.overridden {
        return Ok(());
    }
    let name = subject.name.clone();
    match (&mut subject.value, &source.value) {
        (PropertyValue::Value { value, .. }, PropertyValue::Value { value: src, .. }) => {
            *value = src.clone();
            Ok(())
        }
        (
            PropertyValue::Reference { target },
            PropertyValue::Reference { target: src },
        ) => {
            *target = *src;
            Ok(())
        }
        (
            PropertyValue::Composition { instance },
            PropertyValue::Composition { instance: src },
        ) => copy_category(instance, src, instantiator),
        (PropertyValue::Array { array }, PropertyValue::Array { array: src }) => {
            copy_array(array, src, &name, instantiator)
        }
        (a, b) => Err(mismatch(
            subject.uuid,
            format!("{} vs {} in source", a.describe(), b.describe()),
        )),
    }
}

fn copy_array(
    subject: &mut ArrayInstance,
    source: &ArrayInstance,
    name: &str,
    instantiator: &CategoryInstantiator<'_>,
) -> ModelResult<()> {
    if subject.arity() == Arity::Dynamic {
        // Source length wins: truncate or extend with fresh instances before
        // the per-index copy.
        let item_kind = subject.item_kind().clone();
        while subject.len() > source.len() {
            subject.remove_at(subject.len() - 1)?;
        }
        while subject.len() < source.len() {
            subject.push(instantiator.instantiate_item(name, &item_kind)?)?;
        }
    }
    for (sub, src) in subject.iter_mut().zip(source.iter()) {
        copy_property(sub, src, instantiator)?;
    }
    Ok(())
}
