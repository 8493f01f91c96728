//! Synthetic execution datasets for exploring the analytics without dbt artefacts.
//!
//! Models get exponentially distributed durations and random, loop-free
//! parent links, then are list-scheduled onto a fixed pool of workers so
//! every model starts after all of its parents have finished.

use chrono::{NaiveDateTime, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::SampleDataConfig;
use crate::dataset::Dataset;
use crate::dbt::DatasetError;
use crate::models::{ExecutionRecord, Link};

/// Share of models generated as sources (no parents of their own).
const SOURCE_SHARE: f64 = 0.3;
const MIN_DURATION_MS: i64 = 1_000;
const MAX_DURATION_CAP_MS: i64 = 7_200_000;
const MAX_DURATION_PER_CHAOS_MS: f64 = 600_000.0;
/// Mean duration at chaos level 5.
const MEAN_DURATION_MS: f64 = 600_000.0;
const MAX_PARENTS_CAP: usize = 50;

struct SampleModel {
    id: String,
    duration_ms: i64,
    parents: Vec<usize>,
}

/// Worker slot and `[start, end)` offsets in milliseconds.
type Slot = (usize, i64, i64);

fn validate(config: &SampleDataConfig) -> Result<(), DatasetError> {
    if config.num_workers == 0 {
        return Err(DatasetError::InvalidSampleConfig(
            "num_workers must be at least 1".to_string(),
        ));
    }
    if config.num_models == 0 {
        return Err(DatasetError::InvalidSampleConfig(
            "num_models must be at least 1".to_string(),
        ));
    }
    if !(config.chaos_level.is_finite() && config.chaos_level > 0.0) {
        return Err(DatasetError::InvalidSampleConfig(format!(
            "chaos_level must be a positive number, got {}",
            config.chaos_level
        )));
    }
    Ok(())
}

/// Exponential draw clamped to `[1s, min(2h, 10min * chaos)]`.
fn sample_duration(rng: &mut StdRng, chaos_level: f64) -> i64 {
    let mean = MEAN_DURATION_MS * chaos_level / 5.0;
    let max = ((MAX_DURATION_PER_CHAOS_MS * chaos_level) as i64)
        .min(MAX_DURATION_CAP_MS)
        .max(MIN_DURATION_MS);
    let x: f64 = rng.gen();
    let drawn = (-(1.0 - x).ln() * mean).round() as i64;
    drawn.clamp(MIN_DURATION_MS, max)
}

/// True when `target` is `from` or one of its ancestors.
fn reaches(models: &[SampleModel], from: usize, target: usize) -> bool {
    let mut seen = vec![false; models.len()];
    let mut stack = vec![from];
    while let Some(idx) = stack.pop() {
        if idx == target {
            return true;
        }
        if std::mem::replace(&mut seen[idx], true) {
            continue;
        }
        stack.extend(models[idx].parents.iter().copied());
    }
    false
}

fn generate_links(
    rng: &mut StdRng,
    models: &mut [SampleModel],
    source_count: usize,
    chaos_level: f64,
) -> Vec<Link> {
    let max_parents = ((5.0 * chaos_level).floor() as usize).clamp(1, MAX_PARENTS_CAP);
    let mut links = Vec::new();

    for child in source_count..models.len() {
        let attempts = rng.gen_range(1..=max_parents);
        let mut candidates: Vec<usize> = (0..models.len()).filter(|&i| i != child).collect();

        for _ in 0..attempts {
            if candidates.is_empty() {
                break;
            }
            let pick = rng.gen_range(0..candidates.len());
            let parent = candidates[pick];
            // A rejected candidate stays eligible for later attempts
            if reaches(models, parent, child) {
                continue;
            }
            candidates.swap_remove(pick);
            models[child].parents.push(parent);
            links.push(Link::new(models[parent].id.clone(), models[child].id.clone()));
        }
    }
    links
}

fn parents_end(models: &[SampleModel], slots: &[Option<Slot>], idx: usize) -> i64 {
    models[idx]
        .parents
        .iter()
        .filter_map(|&p| slots[p].map(|(_, _, end)| end))
        .max()
        .unwrap_or(0)
}

/// List scheduling: the ready model whose parents finished earliest goes to
/// the worker that frees up first.
fn schedule(models: &[SampleModel], num_workers: usize) -> Vec<Option<Slot>> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); models.len()];
    let mut pending: Vec<usize> = Vec::with_capacity(models.len());
    for (idx, model) in models.iter().enumerate() {
        pending.push(model.parents.len());
        for &parent in &model.parents {
            children[parent].push(idx);
        }
    }

    let mut ready: Vec<usize> = (0..models.len()).filter(|&i| pending[i] == 0).collect();
    let mut free_at: Vec<i64> = vec![0; num_workers];
    let mut slots: Vec<Option<Slot>> = vec![None; models.len()];

    while !ready.is_empty() {
        // Earliest parent finish wins; ties keep queue order
        let pos = (1..ready.len()).fold(0, |best, k| {
            if parents_end(models, &slots, ready[k]) < parents_end(models, &slots, ready[best]) {
                k
            } else {
                best
            }
        });
        let idx = ready.remove(pos);
        let worker = (1..free_at.len()).fold(0, |best, w| {
            if free_at[w] < free_at[best] {
                w
            } else {
                best
            }
        });

        let start = free_at[worker].max(parents_end(models, &slots, idx));
        let end = start + models[idx].duration_ms;
        free_at[worker] = end;
        slots[idx] = Some((worker, start, end));

        for &child in &children[idx] {
            pending[child] -= 1;
            if pending[child] == 0 {
                ready.push(child);
            }
        }
    }
    slots
}

fn offset(origin: NaiveDateTime, ms: i64) -> Result<NaiveDateTime, DatasetError> {
    TimeDelta::try_milliseconds(ms)
        .and_then(|delta| origin.checked_add_signed(delta))
        .ok_or_else(|| {
            DatasetError::InvalidSampleConfig(format!(
                "generated timeline of {ms} ms does not fit after {origin}"
            ))
        })
}

/// Generate a random dataset whose first model starts at `origin`.
///
/// With `config.seed` set the output is reproducible.
pub fn generate_sample_data(
    config: &SampleDataConfig,
    origin: NaiveDateTime,
) -> Result<Dataset, DatasetError> {
    validate(config)?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let total = config.num_models;
    let source_count = ((total as f64 * SOURCE_SHARE).floor() as usize).max(1);
    let mut models: Vec<SampleModel> = (0..total)
        .map(|i| {
            let id = if i < source_count {
                format!("source.sample.{}", i + 1)
            } else {
                format!("model.sample.{}", i - source_count + 1)
            };
            SampleModel {
                id,
                duration_ms: sample_duration(&mut rng, config.chaos_level),
                parents: Vec::new(),
            }
        })
        .collect();

    let links = generate_links(&mut rng, &mut models, source_count, config.chaos_level);
    let slots = schedule(&models, config.num_workers);

    let mut records = Vec::with_capacity(total);
    for (model, slot) in models.iter().zip(slots) {
        let Some((worker, start, end)) = slot else {
            continue;
        };
        records.push(ExecutionRecord {
            model: model.id.clone(),
            worker: format!("Thread-{:02}", worker + 1),
            started_at: offset(origin, start)?,
            completed_at: offset(origin, end)?,
        });
    }

    debug!(
        models = records.len(),
        links = links.len(),
        workers = config.num_workers,
        "generated sample dataset"
    );
    Ok(Dataset::new(records, links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critical_path::{analyze, build, CancelToken, CriticalPathConfig, NoProgress};
    use chrono::NaiveDate;
    use rustc_hash::FxHashMap;

    fn origin() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn make_config(
        num_workers: usize,
        num_models: usize,
        chaos_level: f64,
        seed: u64,
    ) -> SampleDataConfig {
        SampleDataConfig {
            num_workers,
            num_models,
            chaos_level,
            seed: Some(seed),
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let config = make_config(4, 40, 3.0, 7);
        let first = generate_sample_data(&config, origin()).unwrap();
        let second = generate_sample_data(&config, origin()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_counts_names_and_workers() {
        let dataset = generate_sample_data(&make_config(3, 50, 3.0, 1), origin()).unwrap();

        assert_eq!(dataset.total_models(), 50);
        let sources = dataset
            .records
            .iter()
            .filter(|r| r.model.starts_with("source.sample."))
            .count();
        assert_eq!(sources, 15);
        assert!(dataset
            .workers()
            .iter()
            .all(|w| ["Thread-01", "Thread-02", "Thread-03"].contains(&w.as_str())));
        assert_eq!(
            dataset.records.iter().map(|r| r.started_at).min(),
            Some(origin())
        );
    }

    #[test]
    fn test_links_never_form_a_cycle() {
        let strict = CriticalPathConfig {
            strict_cycles: true,
            ..Default::default()
        };
        for seed in 0..20 {
            let dataset = generate_sample_data(&make_config(5, 60, 8.0, seed), origin()).unwrap();
            let graph = build(&dataset.records, &dataset.links);
            let analysis = analyze(&graph, &strict, &mut NoProgress, &CancelToken::new())
                .unwrap()
                .completed()
                .unwrap();
            assert_eq!(analysis.order.len(), 60, "seed {seed}");
            assert!(!analysis.path.is_empty());
        }
    }

    #[test]
    fn test_records_respect_parent_end_times_and_workers() {
        for seed in 0..20 {
            let dataset = generate_sample_data(&make_config(4, 45, 5.0, seed), origin()).unwrap();
            let by_model: FxHashMap<&str, &ExecutionRecord> = dataset
                .records
                .iter()
                .map(|r| (r.model.as_str(), r))
                .collect();

            for link in &dataset.links {
                let parent = by_model[link.source.as_str()];
                let child = by_model[link.target.as_str()];
                assert!(child.started_at >= parent.completed_at, "seed {seed}");
            }

            let mut per_worker: FxHashMap<&str, Vec<&ExecutionRecord>> = FxHashMap::default();
            for record in &dataset.records {
                per_worker.entry(record.worker.as_str()).or_default().push(record);
            }
            for runs in per_worker.values_mut() {
                runs.sort_by_key(|r| r.started_at);
                for pair in runs.windows(2) {
                    assert!(pair[1].started_at >= pair[0].completed_at, "seed {seed}");
                }
            }
        }
    }

    #[test]
    fn test_durations_stay_within_chaos_bounds() {
        let dataset = generate_sample_data(&make_config(10, 200, 1.0, 3), origin()).unwrap();
        for record in &dataset.records {
            let secs = record.duration_seconds();
            assert!((1.0..=600.0).contains(&secs), "{} took {secs}s", record.model);
        }
    }

    #[test]
    fn test_single_model_dataset() {
        let dataset = generate_sample_data(&make_config(1, 1, 2.0, 0), origin()).unwrap();
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(dataset.records[0].model, "source.sample.1");
        assert!(dataset.links.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let start = origin();
        for config in [
            make_config(0, 10, 3.0, 0),
            make_config(2, 0, 3.0, 0),
            make_config(2, 10, 0.0, 0),
            make_config(2, 10, f64::NAN, 0),
        ] {
            assert!(matches!(
                generate_sample_data(&config, start),
                Err(DatasetError::InvalidSampleConfig(_))
            ));
        }
    }
}
