//! 수신 프레임 진단.

use anyhow::Result;
use std::io::BufRead;
use terminal_stream::{ControlFrame, InboundFrame};

/// 프레임 하나를 분류해 사람이 읽을 수 있는 한 줄로 만듭니다.
pub fn describe(text: &str) -> String {
    match InboundFrame::parse(text) {
        Ok(InboundFrame::Board(delta)) => format!(
            "board {} matched={} ref={} session={}",
            delta.symbol,
            show(delta.matched_price),
            show(delta.ref_price),
            delta.session.as_deref().unwrap_or("-"),
        ),
        Ok(InboundFrame::Index(tick)) => format!("index {} value={}", tick.index, show(tick.value)),
        Ok(InboundFrame::Control(ControlFrame::SessionNotice { market, session })) => {
            format!("session {} -> {}", market, session)
        }
        Ok(InboundFrame::Control(ControlFrame::OrderUpdate { account_id, .. })) => {
            format!("order update for account {}", account_id)
        }
        Ok(InboundFrame::Control(control)) => format!("control {:?}", control),
        Ok(InboundFrame::Unknown(tag)) => format!("unknown frame ({})", tag),
        Err(e) => format!("invalid: {}", e),
    }
}

fn show<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// 인자로 받은 프레임, 없으면 표준 입력의 각 줄을 해석합니다.
pub fn decode_frames(frames: Vec<String>) -> Result<usize> {
    if !frames.is_empty() {
        for frame in &frames {
            println!("{}", describe(frame));
        }
        return Ok(frames.len());
    }

    let mut count = 0;
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        println!("{}", describe(&line));
        count += 1;
    }
    Ok(count)
}
