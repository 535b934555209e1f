//! Basic example of using vigil-eye

use std::sync::Arc;
use std::time::Duration;
use vigil_core::{BoundingBox, Detection, DetectionMode};
use vigil_eye::{DetectionSession, ReplayDetector, ReplayScript, TestPatternCamera, VisionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // Scripted model output: two frames, replayed in turn
    let script = ReplayScript {
        frames: vec![
            vec![
                Detection::new(BoundingBox::new(100.0, 100.0, 50.0, 50.0), "cat", 0.92),
                Detection::new(BoundingBox::new(300.0, 200.0, 80.0, 60.0), "cup", 0.55),
            ],
            vec![Detection::new(BoundingBox::new(110.0, 104.0, 50.0, 48.0), "cat", 0.88)],
        ],
        ..ReplayScript::default()
    };

    let config = VisionConfig {
        initial_mode: DetectionMode::Webcam,
        ..VisionConfig::default()
    };
    let session = DetectionSession::new(
        config,
        Arc::new(ReplayDetector::new(script)),
        Arc::new(TestPatternCamera::new()),
    )?;

    session.open().await?;
    session.resize_container(320.0, 240.0)?;
    session.start_detection()?;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = session.statistics();
        println!(
            "{} objects, avg confidence {}%",
            stats.count,
            stats.average_percent()
        );
        for b in session.overlay() {
            println!(
                "  {} at ({:.0}, {:.0}) {:.0}x{:.0} [{}]",
                b.caption,
                b.bbox.x,
                b.bbox.y,
                b.bbox.width,
                b.bbox.height,
                b.tier.as_str()
            );
        }
    }

    session.shutdown();
    println!("{}", serde_json::to_string_pretty(&session.status())?);
    Ok(())
}

