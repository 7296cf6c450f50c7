//! Name-based lookup of algorithms and objectives.
//!
//! Every plug-in is registered explicitly by [`AlgorithmRegistry::with_defaults`]
//! and [`ObjectiveRegistry::with_defaults`]. Callers list what is available,
//! inspect constructor parameters, and build instances from a JSON object
//! of hyperparameters.

use crate::algorithm::{Algorithm, AlgorithmConfig};
use crate::annealing::{AnnealingParams, SimulatedAnnealing};
use crate::error::{OptimError, Result};
use crate::genetic::{Genetic, GeneticParams, Selection};
use crate::layered::{IntervalKind, LayeredGenetic, LayeredParams};
use crate::objective::{
    AbsoluteNumberConflict, MaxConflict, MaxConflictMinVariation, MinConflictMinDrift, Objective,
    TimeStdDev,
};
use crate::speed::SpeedSet;
use atc_core::ConflictManager;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Hyperparameters keyed by name.
pub type Params = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Bool,
    Integer,
    Float,
    Text,
    FloatList,
}

impl ParamKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Integer => value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::Text => value.is_string(),
            ParamKind::FloatList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_number)),
        }
    }
}

/// One constructor parameter. `default: None` means the parameter is
/// optional and unset by default.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, default: Value) -> Self {
        Self {
            name,
            kind,
            default: Some(default),
        }
    }

    fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }
}

pub type AlgorithmConstructor = fn(&ConflictManager, &Params) -> Result<Box<dyn Algorithm>>;
pub type ObjectiveConstructor = fn(&ConflictManager, &Params) -> Result<Box<dyn Objective>>;

struct Entry<C> {
    params: Vec<ParamSpec>,
    constructor: C,
}

/// Plug-ins of one kind, keyed by name.
pub struct Registry<C> {
    entries: BTreeMap<&'static str, Entry<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C: Copy> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, params: Vec<ParamSpec>, constructor: C) {
        self.entries.insert(name, Entry { params, constructor });
    }

    /// Registered names, sorted.
    pub fn list_available(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Constructor parameters of `name`, in declaration order.
    pub fn constructor_params(&self, name: &str) -> Option<&[ParamSpec]> {
        self.entries.get(name).map(|entry| entry.params.as_slice())
    }

    /// Check `params` against the declared parameters of `name` and
    /// return its constructor.
    fn checked(&self, name: &str, params: &Params) -> Option<Result<C>> {
        let entry = self.entries.get(name)?;
        for (key, value) in params {
            let check = match entry.params.iter().find(|spec| spec.name == key) {
                None => Err(OptimError::invalid(key.as_str(), format!("unknown parameter for {name}"))),
                Some(spec) if !value.is_null() && !spec.kind.accepts(value) => Err(
                    OptimError::invalid(key.as_str(), format!("expected {:?}, got {value}", spec.kind)),
                ),
                Some(_) => Ok(()),
            };
            if let Err(err) = check {
                return Some(Err(err));
            }
        }
        Some(Ok(entry.constructor))
    }
}

pub type AlgorithmRegistry = Registry<AlgorithmConstructor>;
pub type ObjectiveRegistry = Registry<ObjectiveConstructor>;

impl Registry<AlgorithmConstructor> {
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SimulatedAnnealing::NAME, annealing_params(), build_annealing);
        registry.register(Genetic::NAME, genetic_params(), build_genetic);
        registry.register(LayeredGenetic::NAME, layered_params(), build_layered);
        registry
    }

    pub fn instantiate(
        &self,
        name: &str,
        fleet: &ConflictManager,
        params: &Params,
    ) -> Result<Box<dyn Algorithm>> {
        let constructor = self
            .checked(name, params)
            .ok_or_else(|| OptimError::UnknownAlgorithm(name.to_string()))??;
        let algorithm = constructor(fleet, params)?;
        tracing::debug!(algorithm = name, "instantiated algorithm");
        Ok(algorithm)
    }
}

impl Registry<ObjectiveConstructor> {
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "AbsoluteNumberConflict",
            vec![ParamSpec::new("expected", ParamKind::Float, json!(0.0))],
            build_absolute,
        );
        registry.register("MaxConflict", Vec::new(), build_max_conflict);
        registry.register("MaxConflictMinVariation", variation_params(), build_variation);
        registry.register("TimeStdDev", Vec::new(), build_time_std_dev);
        registry.register(
            "MinConflictMinDrift",
            vec![ParamSpec::new("drift_weight", ParamKind::Float, json!(1.0))],
            build_drift,
        );
        registry
    }

    pub fn instantiate(
        &self,
        name: &str,
        fleet: &ConflictManager,
        params: &Params,
    ) -> Result<Box<dyn Objective>> {
        let constructor = self
            .checked(name, params)
            .ok_or_else(|| OptimError::UnknownObjective(name.to_string()))??;
        constructor(fleet, params)
    }
}

fn get_f64(params: &Params, name: &str, default: f64) -> Result<f64> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| OptimError::invalid(name, "expected a number")),
    }
}

fn get_usize(params: &Params, name: &str, default: usize) -> Result<usize> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| OptimError::invalid(name, "expected a non-negative integer")),
    }
}

fn get_bool(params: &Params, name: &str, default: bool) -> Result<bool> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| OptimError::invalid(name, "expected a boolean")),
    }
}

fn get_str<'a>(params: &'a Params, name: &str, default: &'a str) -> Result<&'a str> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_str()
            .ok_or_else(|| OptimError::invalid(name, "expected a string")),
    }
}

fn common_params(number_of_layers: usize) -> Vec<ParamSpec> {
    vec![
        ParamSpec::new("is_minimize", ParamKind::Bool, json!(true)),
        ParamSpec::new("verbose", ParamKind::Bool, json!(false)),
        ParamSpec::optional("timeout", ParamKind::Float),
        ParamSpec::new("number_of_layers", ParamKind::Integer, json!(number_of_layers)),
        ParamSpec::new("speeds", ParamKind::FloatList, json!(SpeedSet::default().values())),
        ParamSpec::optional("speed_min", ParamKind::Float),
        ParamSpec::optional("speed_max", ParamKind::Float),
        ParamSpec::optional("speed_step", ParamKind::Float),
    ]
}

fn algorithm_config(params: &Params, number_of_layers: usize) -> Result<AlgorithmConfig> {
    let timeout = match params.get("timeout") {
        None | Some(Value::Null) => None,
        Some(_) => {
            let secs = get_f64(params, "timeout", 0.0)?;
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(OptimError::invalid("timeout", "must be a non-negative number of seconds"));
            }
            Some(Duration::from_secs_f64(secs))
        }
    };
    let speeds = speed_set(params)?;
    Ok(AlgorithmConfig {
        is_minimize: get_bool(params, "is_minimize", true)?,
        verbose: get_bool(params, "verbose", false)?,
        timeout,
        number_of_layers: get_usize(params, "number_of_layers", number_of_layers)?,
        speeds,
    })
}

/// Either an explicit `speeds` list or a `speed_min`/`speed_max`/`speed_step`
/// range, never both.
fn speed_set(params: &Params) -> Result<SpeedSet> {
    let is_set = |name: &str| params.get(name).is_some_and(|v| !v.is_null());
    let ranged = ["speed_min", "speed_max", "speed_step"];
    if ranged.iter().any(|name| is_set(*name)) {
        if is_set("speeds") {
            return Err(OptimError::invalid("speeds", "give either a list or a range, not both"));
        }
        let mut bounds = [0.0; 3];
        for (bound, name) in bounds.iter_mut().zip(ranged) {
            if !is_set(name) {
                return Err(OptimError::invalid(name, "required when a speed range is given"));
            }
            *bound = get_f64(params, name, 0.0)?;
        }
        let [min, max, step] = bounds;
        return SpeedSet::from_range(min, max, step);
    }
    match params.get("speeds") {
        None | Some(Value::Null) => Ok(SpeedSet::default()),
        Some(value) => {
            let values: Vec<f64> = serde_json::from_value(value.clone())
                .map_err(|err| OptimError::invalid("speeds", err.to_string()))?;
            SpeedSet::new(values)
        }
    }
}

fn annealing_params() -> Vec<ParamSpec> {
    let defaults = AnnealingParams::default();
    let mut params = common_params(1);
    params.extend([
        ParamSpec::new("number_of_transitions", ParamKind::Integer, json!(defaults.number_of_transitions)),
        ParamSpec::new("initial_temperature", ParamKind::Float, json!(defaults.initial_temperature)),
        ParamSpec::new("heat_up_rate", ParamKind::Float, json!(defaults.heat_up_rate)),
        ParamSpec::new("heat_up_acceptance", ParamKind::Float, json!(defaults.heat_up_acceptance)),
        ParamSpec::new("cooling_rate", ParamKind::Float, json!(defaults.cooling_rate)),
        ParamSpec::new("max_heat_up_rounds", ParamKind::Integer, json!(defaults.max_heat_up_rounds)),
    ]);
    params
}

fn build_annealing(fleet: &ConflictManager, params: &Params) -> Result<Box<dyn Algorithm>> {
    let d = AnnealingParams::default();
    let annealing = AnnealingParams {
        number_of_transitions: get_usize(params, "number_of_transitions", d.number_of_transitions)?,
        initial_temperature: get_f64(params, "initial_temperature", d.initial_temperature)?,
        heat_up_rate: get_f64(params, "heat_up_rate", d.heat_up_rate)?,
        heat_up_acceptance: get_f64(params, "heat_up_acceptance", d.heat_up_acceptance)?,
        cooling_rate: get_f64(params, "cooling_rate", d.cooling_rate)?,
        max_heat_up_rounds: get_usize(params, "max_heat_up_rounds", d.max_heat_up_rounds)?,
    };
    let config = algorithm_config(params, 1)?;
    Ok(Box::new(SimulatedAnnealing::new(fleet, config, annealing)?))
}

fn genetic_only_params() -> Vec<ParamSpec> {
    let d = GeneticParams::default();
    vec![
        ParamSpec::new("population_size", ParamKind::Integer, json!(d.population_size)),
        ParamSpec::new("generations", ParamKind::Integer, json!(d.generations)),
        ParamSpec::new("mutation_rate", ParamKind::Float, json!(d.mutation_rate)),
        ParamSpec::new("crossover_rate", ParamKind::Float, json!(d.crossover_rate)),
        ParamSpec::new("early_stopping", ParamKind::Integer, json!(d.early_stopping)),
        ParamSpec::new("selection", ParamKind::Text, json!("roulette")),
        ParamSpec::new("elitism", ParamKind::Bool, json!(d.elitism)),
        ParamSpec::new("over_production", ParamKind::Bool, json!(d.over_production)),
    ]
}

fn genetic_params() -> Vec<ParamSpec> {
    let mut params = common_params(1);
    params.extend(genetic_only_params());
    params
}

fn parse_genetic(params: &Params) -> Result<GeneticParams> {
    let d = GeneticParams::default();
    let selection = match get_str(params, "selection", "roulette")? {
        "roulette" => Selection::Roulette,
        "tournament" => Selection::Tournament,
        other => {
            return Err(OptimError::invalid(
                "selection",
                format!("'{other}' is neither 'roulette' nor 'tournament'"),
            ))
        }
    };
    Ok(GeneticParams {
        population_size: get_usize(params, "population_size", d.population_size)?,
        generations: get_usize(params, "generations", d.generations)?,
        mutation_rate: get_f64(params, "mutation_rate", d.mutation_rate)?,
        crossover_rate: get_f64(params, "crossover_rate", d.crossover_rate)?,
        early_stopping: get_usize(params, "early_stopping", d.early_stopping)?,
        selection,
        elitism: get_bool(params, "elitism", d.elitism)?,
        over_production: get_bool(params, "over_production", d.over_production)?,
    })
}

fn build_genetic(fleet: &ConflictManager, params: &Params) -> Result<Box<dyn Algorithm>> {
    let config = algorithm_config(params, 1)?;
    Ok(Box::new(Genetic::new(fleet, config, parse_genetic(params)?)?))
}

fn layered_params() -> Vec<ParamSpec> {
    let d = LayeredParams::default();
    let mut params = common_params(2);
    params.extend(genetic_only_params());
    params.extend([
        ParamSpec::new("interval_type", ParamKind::Text, json!("group_size")),
        ParamSpec::new("interval_value", ParamKind::Float, json!(5)),
        ParamSpec::new("simulation_end", ParamKind::Float, json!(d.simulation_end)),
        ParamSpec::new("max_shift", ParamKind::Float, json!(d.max_shift)),
        ParamSpec::new("drift_weight", ParamKind::Float, json!(d.drift_weight)),
    ]);
    params
}

fn build_layered(fleet: &ConflictManager, params: &Params) -> Result<Box<dyn Algorithm>> {
    let d = LayeredParams::default();
    let interval = match get_str(params, "interval_type", "group_size")? {
        "group_size" => {
            let size = get_f64(params, "interval_value", 5.0)?;
            if !(size >= 1.0 && size.fract() == 0.0) {
                return Err(OptimError::invalid("interval_value", "group size must be a positive integer"));
            }
            IntervalKind::GroupSize(size as usize)
        }
        "take_off_window" => IntervalKind::TakeOffWindow(get_f64(params, "interval_value", 600.0)?),
        other => {
            return Err(OptimError::invalid(
                "interval_type",
                format!("'{other}' is neither 'group_size' nor 'take_off_window'"),
            ))
        }
    };
    let layered = LayeredParams {
        genetic: parse_genetic(params)?,
        interval,
        simulation_end: get_f64(params, "simulation_end", d.simulation_end)?,
        max_shift: get_f64(params, "max_shift", d.max_shift)?,
        drift_weight: get_f64(params, "drift_weight", d.drift_weight)?,
    };
    let config = algorithm_config(params, 2)?;
    Ok(Box::new(LayeredGenetic::new(fleet, config, layered)?))
}

fn build_absolute(_: &ConflictManager, params: &Params) -> Result<Box<dyn Objective>> {
    Ok(Box::new(AbsoluteNumberConflict::new(get_f64(params, "expected", 0.0)?)))
}

fn build_max_conflict(_: &ConflictManager, _: &Params) -> Result<Box<dyn Objective>> {
    Ok(Box::new(MaxConflict))
}

fn build_time_std_dev(_: &ConflictManager, _: &Params) -> Result<Box<dyn Objective>> {
    Ok(Box::new(TimeStdDev))
}

fn variation_params() -> Vec<ParamSpec> {
    let d = MaxConflictMinVariation::default();
    [
        ("weight_conflicts", d.weight_conflicts),
        ("weight_shared_time", d.weight_shared_time),
        ("weight_time_difference", d.weight_time_difference),
        ("weight_command_count", d.weight_command_count),
        ("weight_speed_variation", d.weight_speed_variation),
        ("weight_command_spacing", d.weight_command_spacing),
        ("threshold_max_time_proximity", d.threshold_max_time_proximity),
        ("threshold_speed_variation", d.threshold_speed_variation),
        ("threshold_min_time_variation_command", d.threshold_min_time_variation_command),
    ]
    .into_iter()
    .map(|(name, default)| ParamSpec::new(name, ParamKind::Float, json!(default)))
    .collect()
}

fn build_variation(_: &ConflictManager, params: &Params) -> Result<Box<dyn Objective>> {
    let d = MaxConflictMinVariation::default();
    Ok(Box::new(MaxConflictMinVariation {
        weight_conflicts: get_f64(params, "weight_conflicts", d.weight_conflicts)?,
        weight_shared_time: get_f64(params, "weight_shared_time", d.weight_shared_time)?,
        weight_time_difference: get_f64(params, "weight_time_difference", d.weight_time_difference)?,
        weight_command_count: get_f64(params, "weight_command_count", d.weight_command_count)?,
        weight_speed_variation: get_f64(params, "weight_speed_variation", d.weight_speed_variation)?,
        weight_command_spacing: get_f64(params, "weight_command_spacing", d.weight_command_spacing)?,
        threshold_max_time_proximity: get_f64(
            params,
            "threshold_max_time_proximity",
            d.threshold_max_time_proximity,
        )?,
        threshold_speed_variation: get_f64(
            params,
            "threshold_speed_variation",
            d.threshold_speed_variation,
        )?,
        threshold_min_time_variation_command: get_f64(
            params,
            "threshold_min_time_variation_command",
            d.threshold_min_time_variation_command,
        )?,
    }))
}

fn build_drift(fleet: &ConflictManager, params: &Params) -> Result<Box<dyn Objective>> {
    Ok(Box::new(MinConflictMinDrift::new(fleet, get_f64(params, "drift_weight", 1.0)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn lists_registered_plugins() {
        let algorithms = AlgorithmRegistry::with_defaults();
        assert_eq!(
            algorithms.list_available(),
            vec!["AlgorithmGenetic", "AlgorithmGeneticLayers", "AlgorithmRecuit"]
        );
        let objectives = ObjectiveRegistry::with_defaults();
        assert_eq!(objectives.list_available().len(), 5);
        assert!(objectives.list_available().contains(&"TimeStdDev"));
    }

    #[test]
    fn describes_constructor_params() {
        let algorithms = AlgorithmRegistry::with_defaults();
        let params = algorithms.constructor_params("AlgorithmRecuit").unwrap();
        assert_eq!(params[0].name, "is_minimize");
        let cooling = params.iter().find(|p| p.name == "cooling_rate").unwrap();
        assert_eq!(cooling.kind, ParamKind::Float);
        assert_eq!(cooling.default, Some(json!(0.99)));
        let timeout = params.iter().find(|p| p.name == "timeout").unwrap();
        assert_eq!(timeout.default, None);
        assert!(algorithms.constructor_params("Nope").is_none());
    }

    #[test]
    fn instantiates_by_name() {
        let fleet = ConflictManager::default();
        let algorithms = AlgorithmRegistry::with_defaults();
        let genetic = algorithms
            .instantiate(
                "AlgorithmGenetic",
                &fleet,
                &params(json!({"population_size": 12, "selection": "tournament"})),
            )
            .unwrap();
        assert_eq!(genetic.name(), "AlgorithmGenetic");

        let layered = algorithms
            .instantiate(
                "AlgorithmGeneticLayers",
                &fleet,
                &params(json!({"interval_type": "take_off_window", "interval_value": 300.0})),
            )
            .unwrap();
        assert_eq!(layered.base().config.number_of_layers, 2);

        let objective = ObjectiveRegistry::with_defaults()
            .instantiate("AbsoluteNumberConflict", &fleet, &params(json!({"expected": 2})))
            .unwrap();
        assert_eq!(objective.evaluate(&fleet), 2.0);
    }

    #[test]
    fn rejects_unknown_names_and_bad_params() {
        let fleet = ConflictManager::default();
        let algorithms = AlgorithmRegistry::with_defaults();
        assert!(matches!(
            algorithms.instantiate("Quantum", &fleet, &Params::new()),
            Err(OptimError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            ObjectiveRegistry::with_defaults().instantiate("Nope", &fleet, &Params::new()),
            Err(OptimError::UnknownObjective(_))
        ));
        assert!(matches!(
            algorithms.instantiate("AlgorithmRecuit", &fleet, &params(json!({"cooling_rate": "fast"}))),
            Err(OptimError::InvalidParameter { .. })
        ));
        assert!(matches!(
            algorithms.instantiate("AlgorithmRecuit", &fleet, &params(json!({"colling_rate": 0.9}))),
            Err(OptimError::InvalidParameter { .. })
        ));
        assert!(matches!(
            algorithms.instantiate("AlgorithmGenetic", &fleet, &params(json!({"selection": "best"}))),
            Err(OptimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn parses_timeout_and_speeds() {
        let config = algorithm_config(
            &params(json!({"timeout": 1.5, "speeds": [0.001, 0.002], "is_minimize": false})),
            1,
        )
        .unwrap();
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.speeds.values(), &[0.001, 0.002]);
        assert!(!config.is_minimize);
        assert!(algorithm_config(&params(json!({"speeds": []})), 1).is_err());
    }

    #[test]
    fn builds_speeds_from_a_range() {
        let config = algorithm_config(
            &params(json!({"speed_min": 0.001, "speed_max": 0.003, "speed_step": 0.001})),
            1,
        )
        .unwrap();
        assert_eq!(config.speeds.values().len(), 3);
        assert!((config.speeds.min() - 0.001).abs() < 1e-12);
        assert!((config.speeds.max() - 0.003).abs() < 1e-12);

        let partial = params(json!({"speed_min": 0.001, "speed_max": 0.003}));
        assert!(matches!(
            algorithm_config(&partial, 1),
            Err(OptimError::InvalidParameter { .. })
        ));
        let both = params(json!({
            "speeds": [0.002], "speed_min": 0.001, "speed_max": 0.003, "speed_step": 0.001
        }));
        assert!(algorithm_config(&both, 1).is_err());

        let genetic = AlgorithmRegistry::with_defaults()
            .instantiate(
                "AlgorithmGenetic",
                &ConflictManager::default(),
                &params(json!({"speed_min": 0.001, "speed_max": 0.002, "speed_step": 0.0005})),
            )
            .unwrap();
        assert_eq!(genetic.base().config.speeds.values().len(), 3);
    }
}
