//! UCI command parsing and the text form of search reports.

use shakmaty::{CastlingMode, Color};

use crate::error::EngineResult;
use crate::position::SearchPosition;
use crate::search::PvInfo;

/// Moves to go assumed when the GUI does not send `movestogo`.
const DEFAULT_MOVES_TO_GO: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    /// `fen` is `None` for `startpos`.
    Position { fen: Option<String>, moves: Vec<String> },
    Go(GoParams),
    SetOption { name: String, value: String },
    Stop,
    Quit,
    Unknown(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GoParams {
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    pub movetime: Option<u64>,
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movestogo: Option<u64>,
    pub infinite: bool,
}

impl UciCommand {
    /// Parses one input line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let cmd = match tokens.next()? {
            "uci" => Self::Uci,
            "isready" => Self::IsReady,
            "ucinewgame" => Self::UciNewGame,
            "position" => parse_position(tokens).unwrap_or_else(|| Self::Unknown(line.trim().to_owned())),
            "go" => Self::Go(GoParams::parse(tokens)),
            "setoption" => parse_setoption(tokens).unwrap_or_else(|| Self::Unknown(line.trim().to_owned())),
            "stop" => Self::Stop,
            "quit" => Self::Quit,
            _ => Self::Unknown(line.trim().to_owned()),
        };
        Some(cmd)
    }

    /// Commands acted on by the input thread while a search is running.
    /// Everything else, `go` included, waits for the search to finish.
    pub fn interrupts_search(&self) -> bool {
        matches!(self, Self::Stop | Self::Quit)
    }
}

fn parse_position<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<UciCommand> {
    let fen = match tokens.next()? {
        "startpos" => {
            if let Some(tok) = tokens.next() {
                if tok != "moves" {
                    return None;
                }
            }
            None
        }
        "fen" => {
            let mut fields = Vec::new();
            for tok in tokens.by_ref() {
                if tok == "moves" {
                    break;
                }
                fields.push(tok);
            }
            if fields.is_empty() {
                return None;
            }
            Some(fields.join(" "))
        }
        _ => return None,
    };
    let moves = tokens.map(str::to_owned).collect();
    Some(UciCommand::Position { fen, moves })
}

fn parse_setoption<'a>(tokens: impl Iterator<Item = &'a str>) -> Option<UciCommand> {
    let mut name = Vec::new();
    let mut value = Vec::new();
    let mut target = None;
    for tok in tokens {
        match tok {
            "name" => target = Some(&mut name),
            "value" => target = Some(&mut value),
            _ => target.as_mut()?.push(tok),
        }
    }
    if name.is_empty() {
        return None;
    }
    Some(UciCommand::SetOption { name: name.join(" "), value: value.join(" ") })
}

impl GoParams {
    fn parse<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Self {
        let mut params = Self::default();
        while let Some(tok) = tokens.next() {
            if tok == "infinite" {
                params.infinite = true;
                continue;
            }
            let Some(arg) = tokens.next() else { break };
            match tok {
                "depth" => params.depth = arg.parse().ok(),
                "nodes" => params.nodes = arg.parse().ok(),
                "movetime" => params.movetime = arg.parse().ok(),
                "wtime" => params.wtime = parse_millis(arg),
                "btime" => params.btime = parse_millis(arg),
                "winc" => params.winc = parse_millis(arg),
                "binc" => params.binc = parse_millis(arg),
                "movestogo" => params.movestogo = arg.parse().ok(),
                _ => log::warn!("ignoring go parameter {tok}"),
            }
        }
        params
    }

    /// Minimum and maximum thinking time in milliseconds for `side`, `None`
    /// when the search is not limited by time.
    pub fn time_budget(&self, side: Color) -> Option<(u64, u64)> {
        if self.infinite {
            return None;
        }
        if let Some(movetime) = self.movetime {
            return Some((movetime, movetime));
        }
        let (time, inc) = match side {
            Color::White => (self.wtime?, self.winc.unwrap_or(0)),
            Color::Black => (self.btime?, self.binc.unwrap_or(0)),
        };
        let moves_to_go = self.movestogo.unwrap_or(DEFAULT_MOVES_TO_GO).max(1);
        let usable = time.saturating_sub(50.min(time / 10));
        let min = (time / moves_to_go + inc).min(usable);
        let max = (min * 5 / 2).min(usable / 2).max(min);
        Some((min, max))
    }
}

/// Clocks may go negative in some GUIs when flagging.
fn parse_millis(arg: &str) -> Option<u64> {
    arg.parse::<i64>().ok().map(|t| t.max(0) as u64)
}

/// Builds the position of a `position` command.
pub fn build_position(fen: Option<&str>, moves: &[String]) -> EngineResult<SearchPosition> {
    let mut pos = match fen {
        Some(fen) => SearchPosition::from_fen(fen)?,
        None => SearchPosition::default(),
    };
    for m in moves {
        pos.play_uci(m)?;
    }
    Ok(pos)
}

/// `info` line for a principal variation report.
pub fn format_pv_info(info: &PvInfo) -> String {
    let mut line = format!("info depth {} score ", info.depth);
    line += &if info.is_mate {
        format!("mate {}", info.score)
    } else {
        format!("cp {}", info.score)
    };
    if info.upper_bound {
        line += " upperbound";
    } else if info.lower_bound {
        line += " lowerbound";
    }
    line += &format!(" time {} nodes {} nps {}", info.time_ms, info.nodes, info.nps);
    if !info.pv.is_empty() {
        line += " pv";
        for m in &info.pv {
            line += &format!(" {}", m.to_uci(CastlingMode::Standard));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Position;

    #[test]
    fn test_parse_position_startpos() {
        assert_eq!(
            UciCommand::parse("position startpos moves e2e4 e7e5"),
            Some(UciCommand::Position { fen: None, moves: vec!["e2e4".into(), "e7e5".into()] })
        );
        assert_eq!(
            UciCommand::parse("position startpos"),
            Some(UciCommand::Position { fen: None, moves: vec![] })
        );
    }

    #[test]
    fn test_parse_position_fen() {
        let cmd = UciCommand::parse("position fen 4k3/8/8/8/8/8/8/4K2R w K - 0 1 moves e1g1").unwrap();
        assert_eq!(
            cmd,
            UciCommand::Position { fen: Some("4k3/8/8/8/8/8/8/4K2R w K - 0 1".into()), moves: vec!["e1g1".into()] }
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(UciCommand::parse("   "), None);
        assert_eq!(UciCommand::parse("isready"), Some(UciCommand::IsReady));
        assert_eq!(UciCommand::parse("position"), Some(UciCommand::Unknown("position".into())));
        assert_eq!(
            UciCommand::parse("setoption name Hash value 16"),
            Some(UciCommand::SetOption { name: "Hash".into(), value: "16".into() })
        );
        assert_eq!(UciCommand::parse("xyzzy 1"), Some(UciCommand::Unknown("xyzzy 1".into())));
    }

    #[test]
    fn test_only_stop_and_quit_interrupt() {
        for line in ["stop", "quit"] {
            assert!(UciCommand::parse(line).unwrap().interrupts_search(), "{line}");
        }
        for line in ["go infinite", "go depth 3", "isready", "position startpos", "ucinewgame"] {
            assert!(!UciCommand::parse(line).unwrap().interrupts_search(), "{line}");
        }
    }

    #[test]
    fn test_parse_go() {
        let Some(UciCommand::Go(params)) = UciCommand::parse("go wtime 60000 btime -10 winc 1000 movestogo 20") else {
            panic!("expected go");
        };
        assert_eq!(params.wtime, Some(60000));
        assert_eq!(params.btime, Some(0));
        assert_eq!(params.winc, Some(1000));
        assert_eq!(params.movestogo, Some(20));
        assert!(!params.infinite);

        let Some(UciCommand::Go(params)) = UciCommand::parse("go infinite depth 7") else {
            panic!("expected go");
        };
        assert!(params.infinite);
        assert_eq!(params.depth, Some(7));
        assert_eq!(params.time_budget(Color::White), None);
    }

    #[test]
    fn test_time_budget() {
        let params = GoParams { movetime: Some(300), ..GoParams::default() };
        assert_eq!(params.time_budget(Color::Black), Some((300, 300)));

        let params = GoParams { wtime: Some(60_000), winc: Some(1000), ..GoParams::default() };
        assert_eq!(params.time_budget(Color::White), Some((3000, 7500)));
        assert_eq!(params.time_budget(Color::Black), None);

        let params = GoParams { btime: Some(100), movestogo: Some(1), ..GoParams::default() };
        let (min, max) = params.time_budget(Color::Black).unwrap();
        assert!(min <= 100 && max >= min);
    }

    #[test]
    fn test_build_position() {
        let pos = build_position(None, &["e2e4".into(), "e7e5".into()]).unwrap();
        assert_eq!(pos.turn(), Color::White);
        assert_eq!(pos.chess().fullmoves().get(), 2);
        assert!(build_position(None, &["e2e5".into()]).is_err());
        assert!(build_position(Some("not a fen"), &[]).is_err());
    }

    #[test]
    fn test_format_pv_info() {
        let pos = SearchPosition::default();
        let m = pos.chess().legal_moves().into_iter().find(|m| m.to() == shakmaty::Square::E4).unwrap();
        let info = PvInfo {
            depth: 3,
            score: 2,
            time_ms: 10,
            nodes: 500,
            nps: 50000,
            is_mate: true,
            upper_bound: false,
            lower_bound: true,
            pv: vec![m],
        };
        assert_eq!(format_pv_info(&info), "info depth 3 score mate 2 lowerbound time 10 nodes 500 nps 50000 pv e2e4");
    }
}
