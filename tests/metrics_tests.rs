#![cfg(feature = "prometheus")]

mod common;

use common::{FakeServer, Mode};
use fluxline::telemetry::client_metrics::InProcessPrometheus;
use fluxline::{Client, Point};
use std::sync::OnceLock;
use std::time::Duration;

fn install_prometheus_once() -> &'static InProcessPrometheus {
    static PROM: OnceLock<InProcessPrometheus> = OnceLock::new();
    PROM.get_or_init(|| {
        InProcessPrometheus::install(Duration::from_millis(25))
            .expect("failed to install in-process prometheus recorder")
    })
}

/// Value of the first sample whose name (and optional label set) starts with `key`.
fn parse_sample(rendered: &str, key: &str) -> Option<f64> {
    rendered
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .find_map(|line| {
            let (name, value) = line.rsplit_once(' ')?;
            let matches = name == key
                || (name.starts_with(key) && name.as_bytes().get(key.len()) == Some(&b'{'));
            if matches {
                value.parse::<f64>().ok()
            } else {
                None
            }
        })
}

fn parse_counter(rendered: &str, base_name: &str) -> f64 {
    parse_sample(rendered, &format!("{}_total", base_name))
        .or_else(|| parse_sample(rendered, base_name))
        .unwrap_or(0.0)
}

fn parse_labelled_counter(rendered: &str, base_name: &str, labels: &str) -> f64 {
    parse_sample(rendered, &format!("{}_total{{{}}}", base_name, labels))
        .or_else(|| parse_sample(rendered, &format!("{}{{{}}}", base_name, labels)))
        .unwrap_or(0.0)
}

#[test]
fn test_pipeline_emits_write_and_transmission_metrics() {
    let prom = install_prometheus_once();
    let before = prom.render();
    let before_points = parse_counter(&before, "fluxline_points_written");
    let before_flushed = parse_counter(&before, "fluxline_lines_flushed");
    let before_dropped = parse_counter(&before, "fluxline_lines_dropped");
    let before_failed =
        parse_labelled_counter(&before, "fluxline_transmissions", "outcome=\"connection_failed\"");

    let server = FakeServer::unreachable();
    let client = Client::new(server.clone());
    client.configure(100, Duration::ZERO).unwrap();
    for i in 0..4 {
        client.write(Point::new("m").add_field("v", i as i64)).unwrap();
    }
    client.flush_now().unwrap();
    server.set_mode(Mode::Accept);
    client.flush_now().unwrap();
    server.set_mode(Mode::Reject);
    client.write(Point::new("m").add_field("v", 9)).unwrap();
    client.flush_now().unwrap();

    let after = prom.render();
    assert_eq!(parse_counter(&after, "fluxline_points_written") - before_points, 5.0);
    assert_eq!(parse_counter(&after, "fluxline_lines_flushed") - before_flushed, 4.0);
    assert_eq!(parse_counter(&after, "fluxline_lines_dropped") - before_dropped, 1.0);
    assert_eq!(
        parse_labelled_counter(&after, "fluxline_transmissions", "outcome=\"connection_failed\"")
            - before_failed,
        1.0
    );
    assert!(parse_sample(&after, "fluxline_flush_duration_seconds_count").unwrap_or(0.0) >= 3.0);
    assert_eq!(parse_sample(&after, "fluxline_buffered_lines"), Some(0.0));
}
