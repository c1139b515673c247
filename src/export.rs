use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::scope::Waveform;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub const HEADER: [&str; 2] = ["time", "value"];

/// Write `waveform` as `time,value` rows.
///
/// Values use the shortest decimal text that parses back to the same `f64`.
pub fn write_csv<W: io::Write>(waveform: &Waveform, writer: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(HEADER)?;
    for sample in waveform.samples() {
        writer.write_record([sample.time.to_string(), sample.value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_csv(waveform: &Waveform, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let path = path.as_ref();
    write_csv(waveform, File::create(path)?)?;
    log::info!("Saved {} samples to {}", waveform.len(), path.display());
    Ok(())
}

/// `ch1_20240131_154502.csv`, stamped with the capture time.
pub fn default_file_name(waveform: &Waveform) -> String {
    format!(
        "{}_{}.csv",
        waveform.channel().as_str().to_ascii_lowercase(),
        waveform.captured_at().format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Channel, Preamble};

    fn waveform() -> Waveform {
        let preamble = Preamble::parse("BIN;RP;1;MSB;4;1.0E-6;0;4.0E-2;128;0").unwrap();
        Waveform::from_codes(Channel::Ch1, preamble, &[128.0, 130.0, 126.0, 128.0]).unwrap()
    }

    #[test]
    fn table_layout() {
        let mut out = Vec::new();
        write_csv(&waveform(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "time,value");
        assert_eq!(lines[1], "0,0");
        assert_eq!(lines[2], "0.000001,0.08");
        assert_eq!(lines[3], "0.000002,-0.08");
    }

    #[test]
    fn values_survive_text() {
        let wfm = waveform();
        let mut out = Vec::new();
        write_csv(&wfm, &mut out).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let rows: Vec<(f64, f64)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].parse().unwrap(), r[1].parse().unwrap())
            })
            .collect();
        let expected: Vec<(f64, f64)> = wfm.samples().iter().map(|s| (s.time, s.value)).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let wfm = waveform();
        let path = dir.path().join(default_file_name(&wfm));
        save_csv(&wfm, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("time,value\n"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ch1_"));
    }
}
