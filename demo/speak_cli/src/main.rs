use std::collections::BTreeMap;

use orator_core::{Orator, OratorConfig, SynthesisRequest};
use tracing::{info, warn};

fn usage() -> ! {
    eprintln!(
        "usage: speak_cli --list-narrator\n       \
         speak_cli --list-emotion <narrator>\n       \
         speak_cli [--narrator <name>] [--emotion k=v,...] [--speed <n>] [--pitch <n>] [--play] <text>\n       \
         speak_cli --request '<json>' [--play]"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,orator_core=info,speak_cli=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1).peekable();
    let mut request = SynthesisRequest::default();
    let mut play = false;
    let mut list_narrator = false;
    let mut list_emotion: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list-narrator" => list_narrator = true,
            "--list-emotion" => list_emotion = Some(args.next().unwrap_or_else(|| usage())),
            "--narrator" => request.narrator = Some(args.next().unwrap_or_else(|| usage())),
            "--emotion" => {
                let expr = args.next().unwrap_or_else(|| usage());
                request.emotion = parse_emotion(&expr).unwrap_or_else(|| usage());
            }
            "--speed" => {
                let v = args.next().unwrap_or_else(|| usage());
                request.speed = Some(v.parse().unwrap_or_else(|_| usage()));
            }
            "--pitch" => {
                let v = args.next().unwrap_or_else(|| usage());
                request.pitch = Some(v.parse().unwrap_or_else(|_| usage()));
            }
            "--request" => {
                let payload = args.next().unwrap_or_else(|| usage());
                request = SynthesisRequest::from_json(&payload)?;
            }
            "--play" => play = true,
            "--help" | "-h" => usage(),
            text if !text.starts_with('-') => request.text = text.to_string(),
            _ => usage(),
        }
    }

    let mut orator = Orator::new(OratorConfig::default());
    orator.start();

    if list_narrator {
        for narrator in orator.engine.list_narrators().await? {
            println!("{narrator}");
        }
        return Ok(());
    }
    if let Some(narrator) = list_emotion {
        for emotion in orator.engine.list_emotions(&narrator).await? {
            println!("{emotion}");
        }
        return Ok(());
    }
    if request.text.trim().is_empty() {
        usage();
    }

    if !orator.narrator_is_valid(request.narrator.as_deref()).await {
        warn!(
            target = "speak_cli",
            narrator = ?request.narrator,
            "narrator not in the engine's list; proceeding anyway"
        );
    }

    info!(target = "speak_cli", text = %request.text, "queueing synthesis");
    let path = orator.speak(request).await?;
    println!("{}", path.display());

    if play {
        orator.player.play(&path).await?;
        orator.release_artifact(&path).await;
        // Everything we produced has been reclaimed.
        orator.shutdown().await;
    } else {
        // Leave the artifact for the caller; tracking state dies with the
        // process, so shutdown (which reclaims all artifacts) is skipped.
        info!(target = "speak_cli", path = %path.display(), "artifact kept on disk");
    }
    Ok(())
}

fn parse_emotion(expr: &str) -> Option<BTreeMap<String, u32>> {
    let mut emotion = BTreeMap::new();
    for pair in expr.split(',') {
        let (key, value) = pair.split_once('=')?;
        emotion.insert(key.trim().to_string(), value.trim().parse().ok()?);
    }
    Some(emotion)
}
