//! Output formats for `floodtrust experiment`.

use std::io::{self, Write};

use clap::ValueEnum;

use engine::evaluation::ExperimentRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

const CSV_HEADER: &str =
    "noise_pct,method,evaluated,tp,fp,tn,fn,accuracy,precision,recall,f1,specificity,auc";

pub fn write_rows<W: Write>(rows: &[ExperimentRow], format: OutputFormat, out: W) -> io::Result<()> {
    match format {
        OutputFormat::Csv => write_csv(rows, out),
        OutputFormat::Json => write_json(rows, out),
    }
}

fn write_csv<W: Write>(rows: &[ExperimentRow], mut out: W) -> io::Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for r in rows {
        let c = &r.confusion;
        let m = &r.metrics;
        writeln!(
            out,
            "{},{},{},{},{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
            r.noise_pct,
            r.method,
            r.evaluated,
            c.tp,
            c.fp,
            c.tn,
            c.fn_,
            m.accuracy,
            m.precision,
            m.recall,
            m.f1,
            m.specificity,
            m.auc
        )?;
    }
    out.flush()
}

fn write_json<W: Write>(rows: &[ExperimentRow], mut out: W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, rows)?;
    writeln!(out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::evaluation::{ClassificationMetrics, ConfusionMatrix};

    fn sample_row() -> ExperimentRow {
        let labels = [true, true, false, false];
        let predicted = [true, false, false, true];
        let scores = [0.9, 0.4, 0.2, 0.8];
        ExperimentRow {
            noise_pct: 15.0,
            method: "three_layer".to_string(),
            evaluated: 4,
            confusion: ConfusionMatrix::from_pairs(&labels, &predicted),
            metrics: ClassificationMetrics::compute(&labels, &predicted, &scores),
        }
    }

    #[test]
    fn test_csv_has_header_and_one_line_per_row() {
        let mut out = Vec::new();
        write_rows(&[sample_row(), sample_row()], OutputFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("15,three_layer,4,1,1,1,1,0.5000"), "got: {}", lines[1]);
        assert_eq!(lines[1].split(',').count(), CSV_HEADER.split(',').count());
    }

    #[test]
    fn test_json_is_an_array_of_rows() {
        let mut out = Vec::new();
        write_rows(&[sample_row()], OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["method"], "three_layer");
        assert_eq!(rows[0]["confusion"]["tp"], 1);
    }
}
