use std::fs;
use std::process::Command;

use epigen::config::{DatasetConfig, ModelConfig};
use epigen::population::NoopProgress;
use epigen::table_io::read_tables_file;
use epigen::{run, RunConfig};
use tempfile::tempdir;

fn small_run(root: &std::path::Path) -> RunConfig {
    RunConfig {
        seed: Some(11),
        quantiles: 2,
        population: 6,
        tries: 5000,
        model_output: Some(root.join("tables.txt")),
        models: vec![ModelConfig {
            id: None,
            heritability: 0.05,
            prevalence: None,
            use_odds_ratio: false,
            fraction: 1.0,
            attribute_names: None,
            minor_allele_frequencies: vec![0.3, 0.3],
        }],
        datasets: vec![DatasetConfig {
            output: root.join("data").join("sim.txt"),
            total_attributes: 5,
            cases: 20,
            controls: 20,
            replicates: 2,
            maf_min: 0.1,
            maf_max: 0.5,
            write_counts: true,
        }],
        ..RunConfig::default()
    }
}

#[test]
fn run_writes_tables_scores_and_datasets() {
    let tmp = tempdir().expect("temporary directory");
    let config = small_run(tmp.path());

    let summary = run(&config, &mut NoopProgress, &mut NoopProgress).expect("run succeeds");
    assert_eq!(summary.quantile_count, 2);
    assert_eq!(summary.files_written, 4);
    assert!(summary.failures.is_empty());

    let scores = fs::read_to_string(tmp.path().join("tables_EDM_Scores.txt")).expect("scores file");
    let mut lines = scores.lines();
    assert_eq!(lines.next(), Some("EDM scores for model: 0"));
    let values: Vec<f64> = lines
        .take_while(|l| !l.is_empty())
        .map(|l| l.parse().expect("numeric score"))
        .collect();
    assert_eq!(values.len(), 6);
    assert!(values.windows(2).all(|w| w[0] <= w[1]));

    let models_path = tmp.path().join("tables_models.txt");
    let header = fs::read_to_string(&models_path).expect("models file");
    assert!(header.starts_with("Selected 2 EDM quantiles from a population of 6 tables."));
    let quantiles = read_tables_file(&models_path).expect("tables parse back");
    assert_eq!(quantiles.len(), 2);
    for quantile in quantiles.iter() {
        assert_eq!(quantile.len(), 1);
        assert_eq!(quantile.tables[0].attribute_names(), ["P1", "P2"]);
        let h = quantile.tables[0].scores().heritability;
        assert!((h - 0.05).abs() < 0.01, "heritability {}", h);
    }

    for q in 1..=2 {
        for r in 1..=2 {
            let dir = tmp.path().join("data").join(format!("sim_EDM-{}", q));
            let text = fs::read_to_string(dir.join(format!("sim_EDM-{}_{}.txt", q, r)))
                .expect("dataset file");
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 41);
            assert_eq!(lines[0], "N0\tN1\tN2\tP1\tP2\tClass");
            assert!(lines[1..21].iter().all(|l| l.ends_with("\t1")));
            assert!(lines[21..].iter().all(|l| l.ends_with("\t0")));
            assert!(dir.join(format!("sim_EDM-{}_{}_counts.txt", q, r)).exists());
        }
    }
}

#[test]
fn same_seed_gives_same_datasets() {
    let first = tempdir().expect("temporary directory");
    let second = tempdir().expect("temporary directory");
    run(&small_run(first.path()), &mut NoopProgress, &mut NoopProgress).expect("first run");
    run(&small_run(second.path()), &mut NoopProgress, &mut NoopProgress).expect("second run");

    let relative = "data/sim_EDM-2/sim_EDM-2_2.txt";
    let a = fs::read_to_string(first.path().join(relative)).expect("first dataset");
    let b = fs::read_to_string(second.path().join(relative)).expect("second dataset");
    assert_eq!(a, b);
}

#[test]
fn tables_from_a_previous_run_can_be_sampled_again() {
    let tmp = tempdir().expect("temporary directory");
    run(&small_run(tmp.path()), &mut NoopProgress, &mut NoopProgress).expect("first run");

    let mut config = small_run(tmp.path());
    config.models.clear();
    config.model_output = None;
    config.model_inputs = vec![tmp.path().join("tables_models.txt")];
    config.datasets[0].output = tmp.path().join("again").join("resampled");
    config.datasets[0].replicates = 1;
    config.datasets[0].write_counts = false;

    let summary = run(&config, &mut NoopProgress, &mut NoopProgress).expect("second run");
    assert_eq!(summary.quantile_count, 2);
    assert_eq!(summary.files_written, 2);
    assert!(tmp
        .path()
        .join("again/resampled_EDM-2/resampled_EDM-2_1.txt")
        .exists());
}

#[test]
fn cli_runs_a_toml_run_file() {
    let tmp = tempdir().expect("temporary directory");
    let run_file = tmp.path().join("run.toml");
    let text = r#"
seed = 3
quantiles = 1
population = 4
tries = 5000
model_output = "out/tables"

[[model]]
heritability = 0.05
minor_allele_frequencies = [0.4, 0.4]

[[dataset]]
output = "out/cli"
total_attributes = 4
cases = 10
controls = 10
replicates = 1
"#;
    fs::write(&run_file, text).expect("write run file");

    let exe = env!("CARGO_BIN_EXE_epigen");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([run_file.to_str().expect("path str"), "--quiet", "--log-level", "warn"])
        .status()
        .expect("run epigen cli");

    assert!(status.success(), "CLI exited with status {status:?}");
    assert!(tmp.path().join("out/tables_models.txt").exists());
    assert!(tmp.path().join("out/cli_EDM-1/cli_EDM-1_1.txt").exists());
}

#[test]
fn cli_rejects_a_missing_run_file() {
    let tmp = tempdir().expect("temporary directory");
    let exe = env!("CARGO_BIN_EXE_epigen");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args(["missing.toml", "--quiet"])
        .status()
        .expect("run epigen cli");
    assert!(!status.success());
}
