//! Parse a captured control-mode stream and print each frame as JSON.
//!
//! Run with: cargo run --package protocol --example dump_frames < capture.txt
//!
//! A capture can be produced with `tmux -C new-session -A -s demo | tee capture.txt`.

use std::io::Read;

use protocol::FrameParser;

fn main() {
    let mut parser = FrameParser::new();
    let mut stdin = std::io::stdin().lock();
    let mut chunk = [0u8; 512];

    loop {
        let read = match stdin.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                eprintln!("read failed: {}", e);
                std::process::exit(1);
            }
        };

        for item in parser.feed(&chunk[..read]) {
            match item {
                Ok(frame) => {
                    let token = frame.token;
                    let response = frame.into_response();
                    println!(
                        "{} {}",
                        token.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
                        serde_json::to_string(&response).expect("serialization failed")
                    );
                }
                Err(e) => eprintln!("protocol error: {}", e),
            }
        }
    }

    if parser.in_frame() || parser.buffered_len() > 0 {
        eprintln!(
            "stream ended mid-frame ({} unterminated byte(s))",
            parser.buffered_len()
        );
    }
    eprintln!("{} noise line(s) skipped", parser.noise_lines());
}
