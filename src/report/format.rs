//! Terminal output for runs, COR calibration and the stage registry.

use crate::cor::{CorModel, CorObservations, CorTable};
use crate::domain::Phase;
use crate::filters::{StageId, registry};
use crate::pipeline::{RunState, StageOutcome};

use super::RunReport;

/// Header, state path and one row per stage.
pub fn format_run_report(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("=== tomo - run report ===\n");
    out.push_str(&format!(
        "Started : {}\n",
        report.started.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!(
        "Finished: {} ({:.2?})\n",
        report.finished.format("%Y-%m-%d %H:%M:%S"),
        report.wall_time()
    ));
    let path: Vec<&str> = report.states.iter().map(|s| state_label(*s)).collect();
    out.push_str(&format!("States  : {}\n\n", path.join(" -> ")));

    push_row(&mut out, "phase", "stage", "outcome", "chunks", "time");
    push_row(&mut out, &"-".repeat(5), &"-".repeat(22), &"-".repeat(10), &"-".repeat(6), &"-".repeat(10));
    for r in &report.records {
        if r.outcome == StageOutcome::Disabled {
            continue;
        }
        let (outcome, chunks) = match &r.outcome {
            StageOutcome::Ran(stats) => ("ran".to_string(), stats.chunks.to_string()),
            StageOutcome::Skipped(reason) => (format!("skipped: {reason}"), "-".to_string()),
            StageOutcome::Disabled => ("disabled".to_string(), "-".to_string()),
        };
        push_row(
            &mut out,
            r.phase.label(),
            r.stage.key(),
            &outcome,
            &chunks,
            &format!("{:.2?}", r.elapsed),
        );
    }

    out.push_str(&format!(
        "\n{} stage(s) ran, {} skipped | pre {:.2?} | post {:.2?}\n",
        report.ran().count(),
        report.skipped().count(),
        report.stage_time(Phase::Pre),
        report.stage_time(Phase::Post)
    ));
    out
}

fn push_row(out: &mut String, phase: &str, stage: &str, outcome: &str, chunks: &str, time: &str) {
    out.push_str(
        format!("{phase:<5} {stage:<22} {chunks:>6} {time:>10} {outcome:<10}")
            .trim_end(),
    );
    out.push('\n');
}

fn state_label(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "idle",
        RunState::PreProcessing => "pre-processing",
        RunState::ReconstructionHandoff => "reconstruction",
        RunState::PostProcessing => "post-processing",
        RunState::Done => "done",
    }
}

/// Fitted line, tilt and the residual of each observation.
pub fn format_cor_model(model: &CorModel, observations: &CorObservations) -> String {
    let mut out = String::new();
    out.push_str("COR regression:\n");
    out.push_str(&format!("- intercept: {:.6} px\n", model.intercept));
    out.push_str(&format!("- slope    : {:.6} px/slice\n", model.slope));
    out.push_str(&format!(
        "- tilt     : {:.6} rad ({:.4} deg)\n",
        model.tilt_rad,
        model.tilt_deg()
    ));
    out.push_str(&format!("- rms      : {:.6} px over {} slice(s)\n\n", model.rms, model.points));

    out.push_str(&format!("{:>8} {:>12} {:>12} {:>12}\n", "slice", "cor", "fit", "residual"));
    out.push_str(&format!("{:-<8} {:-<12} {:-<12} {:-<12}\n", "", "", "", ""));
    for obs in observations.iter() {
        let fit = model.predict(obs.slice_index as f64);
        out.push_str(&format!(
            "{:>8} {:>12.4} {fit:>12.4} {:>12.4}\n",
            obs.slice_index,
            obs.cor,
            obs.cor - fit
        ));
    }
    out
}

/// Dense table, eliding the middle when longer than `max_rows`.
pub fn format_cor_table(table: &CorTable, max_rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>8} {:>12}\n", "slice", "cor"));
    out.push_str(&format!("{:-<8} {:-<12}\n", "", ""));

    let n = table.len();
    let max_rows = max_rows.max(2);
    let row = |out: &mut String, i: usize, c: f64| out.push_str(&format!("{i:>8} {c:>12.4}\n"));
    if n <= max_rows {
        for (i, c) in table.iter() {
            row(&mut out, i, c);
        }
    } else {
        let head = max_rows / 2;
        let tail = max_rows - head;
        for (i, c) in table.iter().take(head) {
            row(&mut out, i, c);
        }
        out.push_str(&format!("{:>8} ({} more)\n", "...", n - max_rows));
        for (i, c) in table.iter().skip(n - tail) {
            row(&mut out, i, c);
        }
    }
    out
}

/// Both chains in execution order with their parameters.
pub fn format_stage_list() -> String {
    let mut out = String::new();
    for phase in [Phase::Pre, Phase::Post] {
        out.push_str(&format!("{}-processing:\n", phase.label()));
        for (i, id) in registry::chain(phase).into_iter().enumerate() {
            push_stage(&mut out, i + 1, id);
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn push_stage(out: &mut String, position: usize, id: StageId) {
    let stage = id.stage();
    let kernel = if stage.external_kernel() { "external" } else { "built-in" };
    out.push_str(&format!("{position:>3}. {:<22} [{kernel}]\n", id.key()));
    for p in stage.params() {
        out.push_str(&format!(
            "       {:<12} {:<6} default={:<8} {}\n",
            p.name,
            p.kind.label(),
            p.default_label(),
            p.doc
        ));
    }
}

/// One line per execution setting compared against the reference run.
pub fn format_determinism(rows: &[(String, bool)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<24} {:<10}\n", "execution", "identical"));
    out.push_str(&format!("{:-<24} {:-<10}\n", "", ""));
    for (label, same) in rows {
        out.push_str(&format!("{label:<24} {}\n", if *same { "yes" } else { "NO" }));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Local;

    use super::*;
    use crate::domain::CorObservation;
    use crate::exec::ExecStats;
    use crate::pipeline::StageRecord;

    #[test]
    fn run_report_lists_ran_and_skipped_but_not_disabled() {
        let report = RunReport::new(
            Local::now(),
            vec![RunState::Idle, RunState::PreProcessing, RunState::Done],
            vec![
                StageRecord {
                    phase: Phase::Pre,
                    stage: StageId::Rotate,
                    outcome: StageOutcome::Disabled,
                    elapsed: Duration::ZERO,
                },
                StageRecord {
                    phase: Phase::Pre,
                    stage: StageId::Median,
                    outcome: StageOutcome::Ran(ExecStats {
                        cores: 2,
                        chunksize: 4,
                        chunks: 3,
                    }),
                    elapsed: Duration::from_millis(5),
                },
                StageRecord {
                    phase: Phase::Pre,
                    stage: StageId::Outliers,
                    outcome: StageOutcome::Skipped("threshold is none".to_string()),
                    elapsed: Duration::ZERO,
                },
            ],
        );
        let text = format_run_report(&report);
        assert!(text.contains("idle -> pre-processing -> done"));
        assert!(text.contains("median"));
        assert!(text.contains("skipped: threshold is none"));
        assert!(!text.contains("rotate"));
        assert!(text.contains("1 stage(s) ran, 1 skipped"));
    }

    #[test]
    fn cor_model_shows_residuals() {
        let obs: CorObservations = vec![CorObservation::new(0, 10.0), CorObservation::new(10, 12.0)].into();
        let model = CorModel::fit(&obs).unwrap();
        let text = format_cor_model(&model, &obs);
        assert!(text.contains("slope    : 0.200000"));
        assert!(text.contains("      10      12.0000      12.0000"));
    }

    #[test]
    fn long_tables_are_elided() {
        let table = CorTable::new((0..100).map(f64::from).collect());
        let text = format_cor_table(&table, 6);
        assert!(text.contains("(94 more)"));
        assert!(text.contains("      99      99.0000"));
        assert_eq!(text.lines().count(), 2 + 6 + 1);
    }

    #[test]
    fn stage_list_marks_external_kernels() {
        let text = format_stage_list();
        assert!(text.starts_with("pre-processing:"));
        assert!(text.contains("ring_removal           [external]"));
        assert!(text.contains("median                 [built-in]"));
    }
}
