use approx::assert_relative_eq;
use flicker_vision::core_modules::utils::image_helper::image_helper::load_stack;
use flicker_vision::{BatchRunner, PipelineConfig};
use std::fs::File;
use std::path::Path;
use tiff::encoder::{TiffEncoder, colortype};

const W: u32 = 64;
const H: u32 = 64;
const FRAMES: usize = 20;
const ORIGINS: [(u32, u32); 3] = [(4, 4), (30, 4), (4, 30)];
const PULSE: [u16; 5] = [100, 200, 255, 200, 100];

fn write_video(path: &Path, frame: impl Fn(usize) -> Vec<u16>) {
    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    for index in 0..FRAMES {
        encoder
            .write_image::<colortype::Gray16>(W, H, &frame(index))
            .unwrap();
    }
}

/// Background 10 with three 6x6 pulses over frames 3..=7.
fn pulsing_frame(index: usize) -> Vec<u16> {
    let mut data = vec![10u16; (W * H) as usize];
    if (3..=7).contains(&index) {
        for (x0, y0) in ORIGINS {
            for y in y0..y0 + 6 {
                for x in x0..x0 + 6 {
                    data[(y * W + x) as usize] = PULSE[index - 3];
                }
            }
        }
    }
    data
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_reader(File::open(path).unwrap()).unwrap()
}

#[tokio::test]
async fn batch_writes_artifacts_and_skips_quiet_videos() {
    let dir = tempfile::tempdir().unwrap();
    write_video(&dir.path().join("cells.tif"), pulsing_frame);
    write_video(&dir.path().join("quiet.tif"), |_| vec![500u16; (W * H) as usize]);
    std::fs::write(dir.path().join("broken.tif"), b"not a tiff").unwrap();

    let runner = BatchRunner::new(PipelineConfig::default(), Some(2)).unwrap();
    let averages = runner.run(dir.path()).await.unwrap();

    // 36 copies each of the pulse values are pooled per flicker.
    let expected = 255.0 / (18820.0f64 / 5.0).sqrt();
    assert_eq!(averages.len(), 1);
    assert_relative_eq!(averages["cells.tif"], expected, epsilon = 1e-9);

    let summary = read_json(&dir.path().join("average_snr_per_video.json"));
    let summary = summary.as_object().unwrap();
    assert_eq!(summary.len(), 1);
    assert!(summary.contains_key("cells.tif"));

    let cells = dir.path().join("cells_new");
    let masks = load_stack(&cells.join("binary_mask.tif")).unwrap();
    assert_eq!((masks.width(), masks.height(), masks.len()), (W, H, FRAMES));
    assert_eq!(masks.sample(5, 4, 4), 255.0);
    assert_eq!(masks.sample(0, 4, 4), 0.0);

    let annotated = image::open(cells.join("annotated.tif")).unwrap();
    assert_eq!((annotated.width(), annotated.height()), (W, H));

    let flickers = read_json(&cells.join("flicker_data.json"));
    let flickers = flickers.as_array().unwrap();
    assert_eq!(flickers.len(), 3);
    for record in flickers {
        assert_eq!(record["total_number_of_flickers"], 3);
        assert_eq!(record["duration"], 5);
        assert_eq!(record["area"], 36);
    }
    assert_eq!(flickers[0]["location"], serde_json::json!([7, 7]));

    let snr = read_json(&cells.join("snr_data.json"));
    assert_eq!(snr["individual_snr"].as_array().unwrap().len(), 3);

    // The quiet video still gets its artifacts, just without flickers.
    let quiet = dir.path().join("quiet_new");
    assert_eq!(read_json(&quiet.join("flicker_data.json")), serde_json::json!([]));
    assert_eq!(
        read_json(&quiet.join("snr_data.json")),
        serde_json::json!({ "individual_snr": [] })
    );
    assert!(!dir.path().join("broken_new").exists());
}

#[tokio::test]
async fn empty_directory_yields_empty_summary() {
    let dir = tempfile::tempdir().unwrap();
    let runner = BatchRunner::new(PipelineConfig::default(), None).unwrap();
    let averages = runner.run(dir.path()).await.unwrap();
    assert!(averages.is_empty());
    assert_eq!(
        read_json(&dir.path().join("average_snr_per_video.json")),
        serde_json::json!({})
    );
}
