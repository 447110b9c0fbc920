use calsample::calibration::CalibrationSystem;
use calsample::instance::Instance;
use calsample::milp::model::ModelLayout;
use calsample::milp::NO_SOLUTION;
use calsample::search::ReplicationResult;
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

/// Rank tolerance of the calibration matrix report.
const RANK_TOLERANCE: f64 = 1e-9;

fn format_objective(obj: f64) -> String {
    if obj >= NO_SOLUTION {
        "-".to_string()
    } else {
        format!("{:.6}", obj * obj)
    }
}

pub fn print_instance_report(instance: &Instance, system: &CalibrationSystem) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Instance").add_attribute(Attribute::Bold),
        Cell::new("N"),
        Cell::new("n"),
        Cell::new("p"),
        Cell::new("Non-zeros"),
        Cell::new("Rank").fg(Color::Cyan),
        Cell::new("w0"),
        Cell::new("Algorithm"),
    ]);
    let rank = system.rank(RANK_TOLERANCE);
    let full_rank = rank == system.n_rows();
    table.add_row(vec![
        Cell::new(&instance.name).add_attribute(Attribute::Bold),
        Cell::new(instance.population),
        Cell::new(instance.sample_size),
        Cell::new(instance.n_calibration),
        Cell::new(system.nnz()),
        Cell::new(format!("{}/{}", rank, system.n_rows())).fg(if full_rank {
            Color::Green
        } else {
            Color::Yellow
        }),
        Cell::new(format!("{:.4}", instance.base_weight())),
        Cell::new(instance.settings.algorithm),
    ]);
    for i in 1..=6 {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
    println!("\n{}", table);

    if instance.n_calibration > 0 {
        let mut totals = Table::new();
        totals.load_preset(ASCII_FULL);
        totals.set_header(vec![
            Cell::new("Vector").add_attribute(Attribute::Bold),
            Cell::new("Total"),
            Cell::new("Non-zeros"),
        ]);
        for (j, (row, total)) in system.auxiliary().iter().zip(system.totals()).enumerate() {
            totals.add_row(vec![
                Cell::new(j + 1),
                Cell::new(format!("{:.4}", total)).set_alignment(CellAlignment::Right),
                Cell::new(row.nnz()).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("{}", totals);
    }

    if !full_rank {
        println!(
            "⚠️  Calibration rows are linearly dependent (rank {} of {}).",
            rank,
            system.n_rows()
        );
    }
}

pub fn print_summary(instance: &Instance, results: &[ReplicationResult]) {
    if results.is_empty() {
        println!("No replications completed.");
        return;
    }
    let layout = ModelLayout::new(instance.population);
    let epsilon = instance.settings.effective_epsilon();

    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Repl").add_attribute(Attribute::Bold),
        Cell::new("Objective²").fg(Color::Cyan),
        Cell::new("Selected"),
        Cell::new("Rounds"),
        Cell::new("Best at"),
        Cell::new("Status"),
    ]);

    for r in results {
        let (obj, selected, best_round) = match &r.best {
            Some(b) => (
                format_objective(b.objective),
                b.sample_size(&layout).to_string(),
                b.round.to_string(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let status = match (&r.best, r.interrupted) {
            (_, true) => Cell::new("interrupted").fg(Color::Yellow),
            (None, _) => Cell::new("no solution").fg(Color::Red),
            (Some(b), _) if b.objective_squared() > epsilon => Cell::new("above ε").fg(Color::Yellow),
            (Some(_), _) => Cell::new("ok").fg(Color::Green),
        };
        table.add_row(vec![
            Cell::new(r.replication + 1).add_attribute(Attribute::Bold),
            Cell::new(obj).fg(Color::Cyan),
            Cell::new(selected),
            Cell::new(r.rounds.len()),
            Cell::new(best_round),
            status,
        ]);
    }
    for i in 1..=4 {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
    println!("\n{}", table);
}
