use super::RadiusGate;
use crate::math::{Vec2, distance_sq};
use crate::pool::{Keyed, PoolPolicy, TickContext};
use crate::records::{EmitterCatalog, EmitterRecord, RecordId};
use std::collections::HashSet;
use std::sync::Arc;

/// Builds the visible structure of an emitter.
pub trait FormFactory {
    type Form;

    fn materialize(&mut self, record: &EmitterRecord, position: Vec2) -> Self::Form;

    fn dispose(&mut self, form: &mut Self::Form);
}

impl Keyed for RecordId {
    type Key = RecordId;

    fn key(&self) -> RecordId {
        *self
    }
}

#[derive(Debug)]
pub struct Form<F> {
    pub record: RecordId,
    /// `None` when the record is unknown to the catalog
    pub form: Option<F>,
}

impl<F> Keyed for Form<F> {
    type Key = RecordId;

    fn key(&self) -> RecordId {
        self.record
    }
}

/// Keeps the forms of nearby emitters built. Forms that are mid-transform
/// stay loaded at any distance.
pub struct FormPolicy<F: FormFactory> {
    catalog: Arc<EmitterCatalog>,
    factory: F,
    gate: RadiusGate,
    transforming: HashSet<RecordId>,
    loaded: HashSet<RecordId>,
}

impl<F: FormFactory> FormPolicy<F> {
    pub const DEFAULT_LOAD_DISTANCE: f32 = 2000.0;
    pub const DEFAULT_MARGIN: f32 = 100.0;

    pub fn new(catalog: Arc<EmitterCatalog>, factory: F) -> Self {
        Self {
            catalog,
            factory,
            gate: RadiusGate::with_margin(Self::DEFAULT_LOAD_DISTANCE, Self::DEFAULT_MARGIN),
            transforming: HashSet::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn with_gate(mut self, gate: RadiusGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Marks a form as transforming (or done transforming).
    pub fn set_transforming(&mut self, record: RecordId, transforming: bool) {
        if transforming {
            self.transforming.insert(record);
        } else {
            self.transforming.remove(&record);
        }
    }

    pub fn is_transforming(&self, record: RecordId) -> bool {
        self.transforming.contains(&record)
    }
}

impl<F: FormFactory> PoolPolicy for FormPolicy<F> {
    type Candidate = RecordId;
    type Resource = Form<F::Form>;

    fn generate(&mut self, ctx: &TickContext) -> Vec<RecordId> {
        self.catalog
            .iter()
            .filter(|(id, record)| {
                self.transforming.contains(id)
                    || self.gate.admits(
                        distance_sq(ctx.observer, record.position),
                        self.loaded.contains(id),
                    )
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn add(
        &mut self,
        record: RecordId,
        _recycling: Option<Form<F::Form>>,
        _ctx: &TickContext,
    ) -> Form<F::Form> {
        let form = match self.catalog.get(record) {
            Some(emitter) => Some(self.factory.materialize(emitter, emitter.position)),
            None => {
                log::warn!("{} is not in the catalog", record);
                None
            }
        };
        Form { record, form }
    }

    fn remove(&mut self, form: &mut Form<F::Form>) {
        if let Some(built) = form.form.as_mut() {
            self.factory.dispose(built);
        }
    }

    fn after_update(&mut self, loaded: &mut [Form<F::Form>], _ctx: &TickContext) {
        self.loaded = loaded.iter().map(|form| form.record).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    #[derive(Default)]
    struct Sculptor {
        built: Vec<String>,
        disposed: usize,
    }

    impl FormFactory for Sculptor {
        type Form = String;

        fn materialize(&mut self, record: &EmitterRecord, _position: Vec2) -> String {
            self.built.push(record.patch_name.clone());
            record.patch_name.clone()
        }

        fn dispose(&mut self, form: &mut String) {
            self.disposed += 1;
            form.clear();
        }
    }

    fn catalog() -> Arc<EmitterCatalog> {
        Arc::new(EmitterCatalog::from_records(vec![
            EmitterRecord::parse("vib 2 3 + 1", 0.0, 1000.0).unwrap(),
            EmitterRecord::parse("sdrone 1 2", 0.0, 3000.0).unwrap(),
        ]))
    }

    fn at(z: f32) -> TickContext {
        TickContext::new(Vec2::new(0.0, z), 0.0)
    }

    #[test]
    fn test_forms_follow_load_distance_with_margin() {
        let mut pool = Pool::new("forms", FormPolicy::new(catalog(), Sculptor::default()));
        pool.reconcile(&at(0.0));
        assert_eq!(pool.policy().factory().built, vec!["vibraphones"]);

        // 2200 from the vibraphones: past the margin
        pool.reconcile(&at(-1200.0));
        assert_eq!(pool.loaded().len(), 0);
        assert_eq!(pool.policy().factory().disposed, 1);

        pool.reconcile(&at(1000.0));
        assert_eq!(pool.loaded().len(), 2);
        // 2050 from the vibraphones: inside the margin, still loaded
        pool.reconcile(&at(3050.0));
        assert_eq!(pool.loaded().len(), 2);
    }

    #[test]
    fn test_transforming_forms_stay_loaded() {
        let mut pool = Pool::new("forms", FormPolicy::new(catalog(), Sculptor::default()));
        pool.reconcile(&at(0.0));
        let id = pool.loaded()[0].record;
        pool.policy_mut().set_transforming(id, true);
        pool.reconcile(&at(-50000.0));
        assert_eq!(pool.loaded().len(), 1);

        pool.policy_mut().set_transforming(id, false);
        pool.reconcile(&at(-50000.0));
        assert!(pool.loaded().is_empty());
    }
}
