//! Most recent frame and map as seen by the supervisor

use crate::core::types::{EncodedFrame, MapSnapshot, Pose, Snapshot};

/// Latest value of each snapshot kind. Each newer snapshot overwrites the
/// previous one of the same kind.
#[derive(Debug, Default)]
pub struct LatestSnapshot {
    frame: Option<EncodedFrame>,
    map: Option<MapSnapshot>,
}

impl LatestSnapshot {
    pub fn apply(&mut self, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Frame(frame) => self.frame = Some(frame),
            Snapshot::Map(map) => self.map = Some(map),
        }
    }

    pub fn frame(&self) -> Option<&EncodedFrame> {
        self.frame.as_ref()
    }

    pub fn map(&self) -> Option<&MapSnapshot> {
        self.map.as_ref()
    }

    /// Pose carried by the latest map
    pub fn position(&self) -> Option<Pose> {
        self.map.as_ref().map(|m| m.pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::OccupancyGrid;

    #[test]
    fn test_kinds_overwrite_independently() {
        let mut latest = LatestSnapshot::default();
        assert!(latest.frame().is_none());
        assert!(latest.position().is_none());

        let frame = |w| EncodedFrame {
            width: w,
            height: 1,
            jpeg: vec![0xFF, 0xD8],
        };
        latest.apply(Snapshot::Frame(frame(1)));
        latest.apply(Snapshot::Frame(frame(2)));
        latest.apply(Snapshot::Map(MapSnapshot {
            grid: OccupancyGrid::new(4, 0.05),
            pose: Pose::new(2.0, 2.0, 45.0),
        }));

        assert_eq!(latest.frame().map(|f| f.width), Some(2));
        assert_eq!(latest.position(), Some(Pose::new(2.0, 2.0, 45.0)));
        assert_eq!(latest.map().map(|m| m.grid.size()), Some(4));
    }
}
