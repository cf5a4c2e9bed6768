const PATTERN_4: [[bool; 4]; 5] = [
    [false, false, false, false],
    [true, false, false, false],
    [true, false, true, false],
    [true, true, true, false],
    [true, true, true, true],
];

const PATTERN_8: [[bool; 8]; 9] = [
    [false, false, false, false, false, false, false, false],
    [true, false, false, false, false, false, false, false],
    [true, false, false, false, true, false, false, false],
    [true, false, false, true, false, false, true, false],
    [true, false, true, false, true, false, true, false],
    [true, true, false, true, true, false, true, false],
    [true, true, true, false, true, true, true, false],
    [true, true, true, true, true, true, true, false],
    [true, true, true, true, true, true, true, true],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PulseTable {
    Four,
    Eight,
    /// Level `i` is on for the first `i` slots.
    Leading,
}

impl PulseTable {
    fn for_segments(segment_count: usize) -> Self {
        match segment_count {
            4 => Self::Four,
            8 => Self::Eight,
            _ => Self::Leading,
        }
    }

    fn slot(self, level: usize, index: usize) -> bool {
        match self {
            Self::Four => PATTERN_4[level][index],
            Self::Eight => PATTERN_8[level][index],
            Self::Leading => index < level,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeatScheduler {
    segment_count: usize,
    table: PulseTable,
    heat_level: usize,
    current_heat_level: usize,
    current_index: usize,
}

impl HeatScheduler {
    pub fn new(segment_count: usize) -> Self {
        let segment_count = segment_count.max(1);
        Self {
            segment_count,
            table: PulseTable::for_segments(segment_count),
            heat_level: 0,
            current_heat_level: 0,
            // Start at the boundary so the first tick latches a fresh level.
            current_index: segment_count,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn heat_level(&self) -> usize {
        self.heat_level
    }

    pub fn set_heat_level(&mut self, level: i64) {
        self.heat_level = level.clamp(0, self.segment_count as i64) as usize;
    }

    /// True when the next `tick` will latch `heat_level` for a new window.
    pub fn about_to_roll_over(&self) -> bool {
        self.current_index >= self.segment_count
    }

    pub fn tick(&mut self) -> bool {
        if self.about_to_roll_over() {
            self.current_heat_level = self.heat_level;
            self.current_index = 0;
        }
        let on = self.table.slot(self.current_heat_level, self.current_index);
        self.current_index += 1;
        on
    }

    pub fn rows(&self) -> Vec<Vec<bool>> {
        (0..=self.segment_count)
            .map(|level| {
                (0..self.segment_count)
                    .map(|index| self.table.slot(level, index))
                    .collect()
            })
            .collect()
    }
}

impl Default for HeatScheduler {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn assert_shape(segment_count: usize) {
        let rows = HeatScheduler::new(segment_count).rows();
        assert_eq!(rows.len(), segment_count + 1);
        assert!(rows.iter().all(|row| row.len() == segment_count));
        assert!(rows[0].iter().all(|on| !on));
        assert!(rows[segment_count].iter().all(|on| *on));
    }

    #[test]
    fn tables_have_expected_shape() {
        for segment_count in [3, 4, 5, 8, 10] {
            assert_shape(segment_count);
        }
    }

    #[test]
    fn leading_table_turns_on_first_slots() {
        let rows = HeatScheduler::new(3).rows();
        assert_eq!(
            rows,
            vec![
                vec![false, false, false],
                vec![true, false, false],
                vec![true, true, false],
                vec![true, true, true],
            ]
        );

        let rows = HeatScheduler::new(6).rows();
        for (level, row) in rows.iter().enumerate() {
            for (index, on) in row.iter().enumerate() {
                assert_eq!(*on, index < level);
            }
        }
    }

    #[test]
    fn eight_segment_rows_match_their_level() {
        for (level, row) in HeatScheduler::new(8).rows().iter().enumerate() {
            assert_eq!(row.iter().filter(|on| **on).count(), level);
        }
    }

    #[test]
    fn clamps_heat_level() {
        let mut scheduler = HeatScheduler::new(4);
        scheduler.set_heat_level(-3);
        assert_eq!(scheduler.heat_level(), 0);
        scheduler.set_heat_level(9);
        assert_eq!(scheduler.heat_level(), 4);
    }

    #[test]
    fn half_level_alternates() {
        let mut scheduler = HeatScheduler::new(4);
        scheduler.set_heat_level(2);
        let pattern: Vec<bool> = (0..4).map(|_| scheduler.tick()).collect();
        assert_eq!(pattern, vec![true, false, true, false]);
    }

    #[test]
    fn level_change_applies_on_next_window() {
        let mut scheduler = HeatScheduler::new(4);
        scheduler.set_heat_level(4);
        assert!(scheduler.about_to_roll_over());
        assert!(scheduler.tick());
        assert!(!scheduler.about_to_roll_over());

        scheduler.set_heat_level(0);
        let rest: Vec<bool> = (0..3).map(|_| scheduler.tick()).collect();
        assert_eq!(rest, vec![true, true, true]);

        assert!(scheduler.about_to_roll_over());
        assert!(!scheduler.tick());
    }
}
