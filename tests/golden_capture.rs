use rfcapture::{CaptureConfig, Capturer, Color, Document, RasterSurface, Window};
use std::fs;
use std::path::PathBuf;

async fn capture(html: &str, selector: &str, config: CaptureConfig) -> RasterSurface {
    let doc = Document::parse_html(html).with_window(Window { width: 16, height: 16, ..Default::default() });
    let id = doc.query_selector(selector).expect("selector matches");
    Capturer::new()
        .render(doc.element(id).unwrap(), config)
        .await
        .expect("capture succeeds")
}

#[tokio::test]
async fn test_capture_golden_pixels() {
    let data = fs::read_to_string("tests/capture_golden.json").expect("Failed to read fixtures");
    let fixtures: serde_json::Value = serde_json::from_str(&data).expect("Invalid JSON");
    for f in fixtures.as_array().unwrap() {
        let name = f["name"].as_str().unwrap();
        let html = f["html"].as_str().unwrap();
        let selector = f["selector"].as_str().unwrap();
        let config = CaptureConfig::from_json(&f["config"].to_string()).expect("fixture config");

        let surface = capture(html, selector, config).await;
        let size = f["size"].as_array().unwrap();
        assert_eq!(
            (surface.width as u64, surface.height as u64),
            (size[0].as_u64().unwrap(), size[1].as_u64().unwrap()),
            "size mismatch for {}",
            name
        );
        for p in f["pixels"].as_array().unwrap() {
            let at = p["at"].as_array().unwrap();
            let (x, y) = (at[0].as_u64().unwrap() as u32, at[1].as_u64().unwrap() as u32);
            let expected = Color::parse(p["color"].as_str().unwrap()).unwrap();
            assert_eq!(surface.pixel(x, y), Some(expected), "pixel ({}, {}) of {}", x, y, name);
        }
    }
}

fn golden_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from("tests/goldens/expected");
    p.push(name);
    p
}

#[tokio::test]
async fn golden_digest_matches_fixture() {
    let html = r#"<html><body><div style="height: 4px; background: #336699"></div><div style="padding: 2px; background: #eeeeee"><div style="height: 4px; width: 50%; background: #cc0000"></div></div></body></html>"#;
    let body_capture = capture(html, "body", CaptureConfig::default()).await;
    // rendering is deterministic
    let again = capture(html, "body", CaptureConfig::default()).await;
    assert_eq!(body_capture.digest(), again.digest());

    let expected_path = golden_path("body_capture.digest");
    if std::env::var("UPDATE_GOLDENS").is_ok() {
        fs::create_dir_all("tests/goldens/expected").ok();
        fs::write(&expected_path, body_capture.digest()).expect("write golden");
        println!("Updated golden: {:?}", expected_path);
        return;
    }

    if !expected_path.exists() {
        println!(
            "No golden at {:?}; run with UPDATE_GOLDENS=1 to create it. Skipping.",
            expected_path
        );
        return;
    }

    let exp = fs::read_to_string(&expected_path).expect("unable to read golden");
    assert_eq!(body_capture.digest(), exp.trim());
}
