//! Scoped annotation store (component B): a read-only view over annotations
//! materialized at construction so that an analyzer can never observe a
//! write from anything it didn't declare as a dependency.

use std::collections::{HashMap, HashSet};

use crate::annotation::{Annotation, AnnotationLevel};

/// A predicate over a materialized `(level, annotation)` pair.
pub type ScopedPredicate<'a> = Box<dyn Fn(AnnotationLevel, &Annotation) -> bool + 'a>;

pub fn by_level<'a>(level: AnnotationLevel) -> ScopedPredicate<'a> {
    Box::new(move |l, _| l == level)
}

pub fn by_name<'a>(name: &'a str) -> ScopedPredicate<'a> {
    Box::new(move |_, a| a.name == name)
}

pub fn by_type<'a>(annotation_type: &'a str) -> ScopedPredicate<'a> {
    Box::new(move |_, a| a.annotation_type == annotation_type)
}

pub fn by_analyzer<'a>(analyzer_id: &'a str) -> ScopedPredicate<'a> {
    Box::new(move |_, a| a.analyzer_id == analyzer_id)
}

/// A dependency-restricted, level-aware view over the per-level annotation
/// accumulator. Constructed once per analyzer invocation; it never reflects
/// writes that land in the accumulator after construction.
#[derive(Debug, Clone)]
pub struct ScopedAnnotationStore {
    materialized: Vec<(AnnotationLevel, Annotation)>,
}

impl ScopedAnnotationStore {
    /// Materialize the view: only annotations whose `analyzer_id` appears in
    /// `dependency_analyzer_ids` are kept, in canonical level order,
    /// preserving within-level insertion order. Empty dependency IDs are
    /// dropped rather than matching framework-emitted (empty `analyzer_id`)
    /// annotations.
    pub fn new(
        dependency_analyzer_ids: &[String],
        annotations_by_level: &HashMap<AnnotationLevel, Vec<Annotation>>,
    ) -> Self {
        let deps: HashSet<&str> = dependency_analyzer_ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(String::as_str)
            .collect();

        let mut materialized = Vec::new();
        for level in AnnotationLevel::CANONICAL_ORDER {
            let Some(annotations) = annotations_by_level.get(&level) else {
                continue;
            };
            for annotation in annotations {
                if deps.contains(annotation.analyzer_id.as_str()) {
                    materialized.push((level, annotation.clone()));
                }
            }
        }

        Self { materialized }
    }

    /// All materialized annotations, in canonical level order, preserving
    /// within-level insertion order.
    pub fn dependency_annotations(&self) -> Vec<(AnnotationLevel, &Annotation)> {
        self.materialized.iter().map(|(l, a)| (*l, a)).collect()
    }

    /// Apply every predicate as a conjunction. An empty predicate list
    /// matches everything.
    pub fn filter(&self, predicates: &[ScopedPredicate<'_>]) -> Vec<&Annotation> {
        self.materialized
            .iter()
            .filter(|(level, annotation)| predicates.iter().all(|p| p(*level, annotation)))
            .map(|(_, a)| a)
            .collect()
    }
}
