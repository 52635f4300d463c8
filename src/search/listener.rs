use shakmaty::Move;

/// One principal variation report.
#[derive(Clone, Debug)]
pub struct PvInfo {
    pub depth: i32,
    /// Centipawns, or moves to mate when `is_mate` is set (negative when
    /// the side to move is getting mated).
    pub score: i32,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    pub is_mate: bool,
    pub upper_bound: bool,
    pub lower_bound: bool,
    pub pv: Vec<Move>,
}

/// Receives progress reports from a running search. All methods default to
/// doing nothing.
pub trait SearchListener {
    fn notify_depth(&mut self, _depth: i32) {}

    /// `move_nr` counts from 1.
    fn notify_curr_move(&mut self, _m: &Move, _move_nr: usize) {}

    fn notify_pv(&mut self, _info: &PvInfo) {}

    fn notify_stats(&mut self, _nodes: u64, _nps: u64, _time_ms: u64) {}
}
