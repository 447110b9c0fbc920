use crate::config::OutputFormat;
use crate::error::{CalError, CalResult};
use crate::instance::Instance;
use crate::milp::model::ModelLayout;
use crate::search::ReplicationResult;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// `instance.txt` becomes `instance.sol`; any other name gets `.sol`
/// appended.
pub fn default_output_path(instance_path: &Path) -> PathBuf {
    let text = instance_path.to_string_lossy();
    match text.find(".txt") {
        Some(pos) => PathBuf::from(format!("{}.sol", &text[..pos])),
        None => PathBuf::from(format!("{}.sol", text)),
    }
}

/// Six decimals with trailing zeros dropped.
pub fn format_number(x: f64) -> String {
    let s = format!("{:.6}", x);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        _ => s.to_string(),
    }
}

/// Writes replication results as CSV, one row per replication or one
/// block of N rows per replication.
pub struct ResultSink<W: Write> {
    writer: csv::Writer<W>,
    format: OutputFormat,
    layout: ModelLayout,
}

impl ResultSink<File> {
    pub fn create<P: AsRef<Path>>(path: P, instance: &Instance) -> CalResult<Self> {
        info!("Writing file {}", path.as_ref().display());
        let file = File::create(path)?;
        Self::new(file, instance)
    }
}

impl<W: Write> ResultSink<W> {
    /// Wraps `inner` and writes the header line.
    pub fn new(inner: W, instance: &Instance) -> CalResult<Self> {
        let writer = csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_writer(inner);
        let mut sink = Self {
            writer,
            format: instance.settings.out_format,
            layout: ModelLayout::new(instance.population),
        };
        sink.write_header(instance)?;
        Ok(sink)
    }

    fn write_header(&mut self, instance: &Instance) -> CalResult<()> {
        match self.format {
            OutputFormat::Row => {
                let ids: Vec<String> = (0..instance.population).map(|i| instance.unit_id(i)).collect();
                let mut record = Vec::with_capacity(1 + 2 * ids.len());
                record.push(instance.population.to_string());
                record.extend(ids.iter().cloned());
                record.extend(ids);
                self.writer.write_record(&record)?;
            }
            OutputFormat::Block => {
                self.writer.write_record(["R", "F", "ID", "S", "W"])?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Nothing is written for a replication without solution.
    pub fn write(&mut self, result: &ReplicationResult, instance: &Instance) -> CalResult<()> {
        let Some(best) = &result.best else {
            return Ok(());
        };
        let obj = format_number(best.objective_squared());
        let selected = best.selected(&self.layout);
        let weights = best.weights(instance);

        match self.format {
            OutputFormat::Row => {
                let mut record = Vec::with_capacity(1 + 2 * selected.len());
                record.push(obj);
                record.extend(selected.iter().map(|&b| if b { "1" } else { "0" }.to_string()));
                record.extend(weights.iter().map(|&w| format_number(w)));
                self.writer.write_record(&record)?;
            }
            OutputFormat::Block => {
                let repl = (result.replication + 1).to_string();
                for (i, (&picked, &w)) in selected.iter().zip(&weights).enumerate() {
                    self.writer.write_record([
                        repl.as_str(),
                        obj.as_str(),
                        instance.unit_id(i).as_str(),
                        if picked { "1" } else { "0" },
                        format_number(w).as_str(),
                    ])?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> CalResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| CalError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::BestSolution;

    fn result() -> (Instance, ReplicationResult) {
        let inst = Instance::new("out", 4, 2, 1, vec![1.0, 2.0, 3.0, 1.0]).unwrap();
        let best = BestSolution {
            objective: 2f64.sqrt(),
            columns: vec![2f64.sqrt(), -1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
            round: 1,
        };
        let res = ReplicationResult {
            replication: 0,
            best: Some(best),
            rounds: Vec::new(),
            first_seed: None,
            interrupted: false,
        };
        (inst, res)
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(default_output_path(Path::new("data/a.txt")), PathBuf::from("data/a.sol"));
        assert_eq!(default_output_path(Path::new("data/a.dat")), PathBuf::from("data/a.dat.sol"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-0.0000001), "0");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_row_format() {
        let (inst, res) = result();
        let mut sink = ResultSink::new(Vec::new(), &inst).unwrap();
        sink.write(&res, &inst).unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "4,1,2,3,4,1,2,3,4\n2,1,1,0,0,1,3,0,0\n");
    }

    #[test]
    fn test_block_format() {
        let (mut inst, res) = result();
        inst.settings.out_format = OutputFormat::Block;
        let mut sink = ResultSink::new(Vec::new(), &inst).unwrap();
        sink.write(&res, &inst).unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "R,F,ID,S,W");
        assert_eq!(lines[1], "1,2,1,1,1");
        assert_eq!(lines[4], "1,2,4,0,0");
        assert_eq!(lines.len(), 5);
    }
}
