use feedmon_core::matrix::{compose, series_to_grid, text_to_grid, BLANK, MARK};
use feedmon_core::series::{
    generate_random_walk, resample, round_to_places, series_max, squash,
};
use rand::{rngs::StdRng, SeedableRng};

fn render(series: &[f64], width: usize, height: usize, status: &str) -> feedmon_core::Grid {
    let graph_width = width / 3 * 2;
    let resampled = round_to_places(&resample(series, graph_width), 6);
    let fitted = squash(&resampled, height.saturating_sub(1) as f64);
    let graph = series_to_grid(&fitted);
    let text = text_to_grid(status);
    compose(
        &graph,
        0,
        height.saturating_sub(graph.height()),
        &text,
        graph_width + 1,
        0,
    )
}

#[test]
fn graph_fills_height_and_sits_left_of_status() {
    let mut rng = StdRng::seed_from_u64(11);
    let walk = generate_random_walk(&mut rng, 90, 4.0, 30.0);
    let frame = render(&walk, 60, 20, "chat.example.net\n====\n\nmessages received:  12");

    assert_eq!(frame.height(), 20);
    assert_eq!(frame.width(), 41 + "messages received:  12".len());

    for col in 0..40 {
        let marks = (0..frame.height())
            .filter(|row| frame.get(col, *row) == Some(MARK))
            .count();
        assert_eq!(marks, 1, "column {col} should carry exactly one mark");
    }
    assert!((0..40).any(|col| frame.get(col, 0) == Some(MARK)));
    assert!((0..40).any(|col| frame.get(col, 19) == Some(MARK)));
    assert_eq!(frame.get(40, 5), Some(BLANK));
    assert_eq!(frame.row(0)[41..].iter().collect::<String>(), "chat.example.net      ");
}

#[test]
fn flat_series_draws_baseline_at_bottom() {
    let frame = render(&[3.0, 3.0, 3.0], 30, 10, "idle");
    assert_eq!(frame.height(), 10);
    for col in 0..20 {
        assert_eq!(frame.get(col, 9), Some(MARK));
    }
    assert_eq!(frame.get(0, 8), Some(BLANK));
}

#[test]
fn resampled_series_keeps_shape_after_squash() {
    let series = vec![0.0, 10.0, 0.0, 10.0];
    let fitted = squash(&resample(&series, 8), 4.0);
    assert!((series_max(&fitted) - 4.0).abs() < 1e-9);
    assert_eq!(fitted.len(), 8);
    assert_eq!(fitted[0], 0.0);
    assert!((fitted[2] - 4.0).abs() < 1e-9);
}
