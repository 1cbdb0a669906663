use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{info, warn};

use crate::particle::Position;

/// Destination for per-step particle positions.
pub trait SnapshotSink {
    /// Appends one snapshot; `positions` are in particle index order.
    fn append(&mut self, side: f64, positions: &[Position]) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Plain-text trajectory: a `"<n> <L>"` header, then `n` lines of `"<x> <y>"`
/// per snapshot.
pub struct TrajectoryWriter<W: Write> {
    out: W,
    header_written: bool,
}

impl TrajectoryWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        info!("Writing trajectory to {}", path.as_ref().display());
        Ok(Self::new(BufWriter::with_capacity(256 * 1024, file)))
    }
}

/// Opens the trajectory file if one was requested.
///
/// An unusable path is not fatal: it is logged and the run saves nothing.
pub fn open_sink(path: Option<&Path>) -> Option<TrajectoryWriter<BufWriter<File>>> {
    let path = path?;
    match TrajectoryWriter::create(path) {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!("Cannot open {}: {e}; running without output", path.display());
            None
        }
    }
}

impl<W: Write> TrajectoryWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SnapshotSink for TrajectoryWriter<W> {
    fn append(&mut self, side: f64, positions: &[Position]) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "{} {}", positions.len(), side)?;
            self.header_written = true;
        }
        for p in positions {
            writeln!(self.out, "{} {}", p.x, p.y)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// In-memory trajectory, one frame per snapshot.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Trajectory {
    pub side: Option<f64>,
    pub frames: Vec<Vec<Position>>,
}

impl SnapshotSink for Trajectory {
    fn append(&mut self, side: f64, positions: &[Position]) -> io::Result<()> {
        self.side = Some(side);
        self.frames.push(positions.to_vec());
        Ok(())
    }
}

/// Decides when a snapshot is due and forwards it to the sink.
///
/// A failing sink is dropped with a warning and the run carries on.
pub struct Recorder<'a> {
    sink: Option<&'a mut dyn SnapshotSink>,
    save_frequency: usize,
    positions: Vec<Position>,
    saved: usize,
}

impl<'a> Recorder<'a> {
    pub fn new(sink: Option<&'a mut dyn SnapshotSink>, save_frequency: usize) -> Self {
        Self {
            sink,
            save_frequency: save_frequency.max(1),
            positions: Vec::new(),
            saved: 0,
        }
    }

    pub fn is_due(&self, step: usize) -> bool {
        self.sink.is_some() && step % self.save_frequency == 0
    }

    pub fn record(&mut self, side: f64, positions: impl IntoIterator<Item = Position>) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        self.positions.clear();
        self.positions.extend(positions);
        match sink.append(side, &self.positions) {
            Ok(()) => self.saved += 1,
            Err(e) => {
                warn!("Snapshot write failed, continuing without output: {e}");
                self.sink = None;
            }
        }
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn finish(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.finish() {
                warn!("Failed to flush trajectory output: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl SnapshotSink for FailingSink {
        fn append(&mut self, _side: f64, _positions: &[Position]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn writer_emits_header_once() {
        let mut writer = TrajectoryWriter::new(Vec::new());
        let frame = [Position::new(0.5, 0.25), Position::new(1.0, 0.0)];
        writer.append(2.0, &frame).unwrap();
        writer.append(2.0, &frame).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["2 2", "0.5 0.25", "1 0", "0.5 0.25", "1 0"]);
    }

    #[test]
    fn unusable_output_path_gives_no_sink() {
        let missing = std::env::temp_dir()
            .join("cell-list-no-such-dir")
            .join("nested")
            .join("out.txt");
        assert!(open_sink(Some(missing.as_path())).is_none());
        assert!(open_sink(None).is_none());
    }

    #[test]
    fn requested_output_path_is_created() {
        let path = std::env::temp_dir().join(format!("cell-list-{}.txt", std::process::id()));
        let mut writer = open_sink(Some(path.as_path())).unwrap();
        writer.append(1.0, &[Position::new(0.5, 0.5)]).unwrap();
        writer.finish().unwrap();
        drop(writer);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1 1\n0.5 0.5\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn recorder_saves_on_frequency() {
        let mut trajectory = Trajectory::default();
        {
            let mut recorder = Recorder::new(Some(&mut trajectory), 10);
            for step in 0..25 {
                if recorder.is_due(step) {
                    recorder.record(1.0, [Position::new(step as f64, 0.0)]);
                }
            }
            assert_eq!(recorder.saved(), 3);
        }
        assert_eq!(trajectory.frames.len(), 3);
        assert_eq!(trajectory.frames[2][0].x, 20.0);
    }

    #[test]
    fn recorder_without_sink_is_never_due() {
        let recorder = Recorder::new(None, 1);
        assert!(!recorder.is_due(0));
    }

    #[test]
    fn failing_sink_is_dropped() {
        let mut sink = FailingSink;
        let mut recorder = Recorder::new(Some(&mut sink), 1);
        assert!(recorder.is_due(0));
        recorder.record(1.0, [Position::zeros()]);
        assert!(!recorder.is_due(1));
        assert_eq!(recorder.saved(), 0);
    }
}
