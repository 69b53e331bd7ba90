mod common;

use common::{param, spawn_server, Params, TestServer};
use futures::future::join_all;
use grapher_map_scanner::{
    classify::{SingleYear, YesNo},
    report::{write_report, Summary},
    ScanSettings, Scanner,
};
use serde_json::{json, Value};
use std::{fs, path::Path};
use tempfile::tempdir;

const COLUMNS: [&str; 6] = ["id", "slug", "title", "type", "isPublished", "config"];

fn settings(server: &TestServer, dir: &Path) -> ScanSettings {
    ScanSettings {
        api_url: server.url("owid.json"),
        grapher_url: server.url("grapher"),
        metadata_url: server.url("indicators"),
        output: dir.join("maps.csv"),
        cache_dir: dir.join("cache"),
        debug_dump: Some(dir.join("debug_data.json")),
        page_size: 2,
        ..ScanSettings::default()
    }
}

fn offset_of(params: &Params) -> Option<usize> {
    let sql = param(params, "sql")?;
    sql.rsplit("OFFSET").next()?.trim().parse().ok()
}

/// Inventory service over `pages`, keyed by offset, with a count probe.
fn inventory(path: &str, params: &Params, pages: &[(usize, Value)], total: usize) -> (u16, String) {
    assert_eq!(path, "/owid.json");
    let sql = param(params, "sql").unwrap_or_default();
    if sql.contains("count(id)") {
        return (200, json!({"columns": ["total"], "rows": [[total]]}).to_string());
    }
    let offset = offset_of(params).unwrap_or(0);
    let rows = pages
        .iter()
        .find(|(o, _)| *o == offset)
        .map(|(_, rows)| rows.clone())
        .unwrap_or_else(|| json!([]));
    (200, json!({"columns": COLUMNS, "rows": rows}).to_string())
}

fn sample_pages() -> Vec<(usize, Value)> {
    vec![
        (
            0,
            json!([
                [390, "population-with-un-projections", "Population", "LineChart", "True",
                 "{\"hasMapTab\":true}"],
                [500, "single-year-map", "Single year", "WorldMap", "True",
                 "{\"tab\":\"map\",\"map\":{\"hideTimeline\":true}}"]
            ]),
        ),
        (
            2,
            json!([
                [600, "no-data-chart", "No data", "LineChart", false,
                 "{\"dimensions\":[{\"property\":\"x\",\"variableId\":7}]}"],
                [700, "indicator-fallback", "Fallback", "LineChart", "False",
                 "{\"hasMapTab\":true,\"dimensions\":[{\"property\":\"y\",\"variableId\":42}]}"]
            ]),
        ),
        (
            4,
            json!([
                [390, "population-with-un-projections", "Population", "LineChart", "True",
                 "{\"hasMapTab\":true}"]
            ]),
        ),
    ]
}

fn sample_routes(path: &str, params: &Params) -> (u16, String) {
    match path {
        "/owid.json" => inventory(path, params, &sample_pages(), 5),
        "/grapher/population-with-un-projections.csv" => (
            200,
            "Entity,Code,Year,Population\nFrance,FRA,2000,60\nGermany,DEU,2000,82\nFrance,FRA,2001,61\n"
                .to_string(),
        ),
        "/grapher/indicator-fallback.csv" => (200, String::new()),
        "/indicators/42.metadata.json" => (
            200,
            json!({"dimensions": {"years": {"values": [{"id": 1990}, {"id": 2000}]}}}).to_string(),
        ),
        _ => (404, "not found".to_string()),
    }
}

#[tokio::test]
async fn test_sequential_scan_end_to_end() {
    let server = spawn_server(sample_routes).await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(settings(&server, tmp.path())).unwrap();

    let outcome = scanner.run().await.unwrap();
    assert!(outcome.inventory_complete);
    assert_eq!(outcome.inventory_size, 4);

    let rows = &outcome.rows;
    let ids: Vec<&str> = rows.iter().map(|r| r.chart_id.as_str()).collect();
    assert_eq!(ids, vec!["390", "500", "600", "700"]);

    let population = &rows[0];
    assert_eq!(population.has_map_tab, YesNo::Yes);
    assert_eq!(population.single_year_data, SingleYear::No);
    assert_eq!(population.len_years, 2);
    assert!(population.url.ends_with("/grapher/population-with-un-projections?tab=map"));
    assert_eq!(population.max_time.as_deref(), Some("2001"));
    assert_eq!(population.min_time.as_deref(), Some("2000"));

    let single = &rows[1];
    assert_eq!(single.has_map_tab, YesNo::Yes);
    assert_eq!(single.single_year_data, SingleYear::Yes);
    assert_eq!(single.has_timeline, YesNo::No);
    assert_eq!(single.len_years, 0);

    let no_data = &rows[2];
    assert_eq!(no_data.has_map_tab, YesNo::No);
    assert_eq!(no_data.single_year_data, SingleYear::Unknown);
    assert_eq!(no_data.len_years, 0);
    assert!(!no_data.url.contains('?'));

    let fallback = &rows[3];
    assert_eq!(fallback.single_year_data, SingleYear::No);
    assert_eq!(fallback.len_years, 2);
    assert_eq!(fallback.max_time.as_deref(), Some("2000"));

    assert_eq!(server.hits("/grapher/population-with-un-projections.csv"), 1);
    assert_eq!(server.hits("/indicators/42.metadata.json"), 1);
    assert_eq!(server.hits("/indicators/7.metadata.json"), 0);

    // failed and empty downloads are still cached
    let cache = tmp.path().join("cache");
    assert_eq!(fs::read_to_string(cache.join("single-year-map.csv")).unwrap(), "");
    assert_eq!(fs::read_to_string(cache.join("indicator-fallback.csv")).unwrap(), "");

    let dump: Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("debug_data.json")).unwrap())
            .unwrap();
    assert_eq!(dump["rows"].as_array().unwrap().len(), 2);

    let written = write_report(&scanner.settings().output, rows).unwrap();
    assert_eq!(written.rows, 4);
    assert_eq!(written.published_rows, Some(2));
    let subset = fs::read_to_string(&written.paths.published).unwrap();
    let subset_ids: Vec<&str> = subset
        .trim_start_matches('\u{feff}')
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(subset_ids, vec!["390", "500"]);

    let summary = Summary::from_rows(rows);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.with_map, 3);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.single_year, 1);
    assert_eq!(summary.unknown_years, 1);
}

#[tokio::test]
async fn test_export_years_win_over_indicator_metadata() {
    let pages = vec![(
        0usize,
        json!([
            [12, "life-expectancy", "Life expectancy", "LineChart", "True",
             "{\"hasMapTab\":true,\"dimensions\":[{\"property\":\"y\",\"variableId\":42}]}"]
        ]),
    )];
    let server = spawn_server(move |path, params| match path {
        "/owid.json" => inventory(path, params, &pages, 1),
        "/grapher/life-expectancy.csv" => {
            (200, "Entity,Code,Year,Life\nFrance,FRA,2019,82\nSpain,ESP,2019,83\n".to_string())
        }
        "/indicators/42.metadata.json" => (
            200,
            json!({"dimensions": {"years": {"values": [{"id": 1950}, {"id": 2019}]}}}).to_string(),
        ),
        _ => (404, String::new()),
    })
    .await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(settings(&server, tmp.path())).unwrap();

    let rows = scanner.run().await.unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len_years, 1);
    assert_eq!(rows[0].single_year_data, SingleYear::Yes);
    assert_eq!(rows[0].min_time.as_deref(), Some("2019"));
    assert_eq!(server.hits("/grapher/life-expectancy.csv"), 1);
    assert_eq!(server.hits("/indicators/42.metadata.json"), 0);
    assert_eq!(scanner.years().network_fetches(), 1);
}

#[tokio::test]
async fn test_second_run_reads_exports_from_cache() {
    let server = spawn_server(sample_routes).await;
    let tmp = tempdir().unwrap();

    let first = Scanner::new(settings(&server, tmp.path())).unwrap();
    let rows_first = first.run().await.unwrap().rows;
    let second = Scanner::new(settings(&server, tmp.path())).unwrap();
    let rows_second = second.run().await.unwrap().rows;

    assert_eq!(rows_first, rows_second);
    assert_eq!(server.hits("/grapher/population-with-un-projections.csv"), 1);
    assert_eq!(server.hits("/grapher/single-year-map.csv"), 1);
    // only the indicator metadata is asked for again
    assert_eq!(second.years().network_fetches(), 1);
}

#[tokio::test]
async fn test_pooled_scan_is_sorted_and_fetches_once() {
    let charts: Vec<Value> = (1..=20)
        .rev()
        .map(|i| json!([i, format!("chart-{}", i), format!("Chart {}", i), "LineChart", 1, "{\"hasMapTab\":1}"]))
        .collect();
    let pages = vec![(0usize, Value::Array(charts))];
    let server = spawn_server(move |path, params| {
        if path == "/owid.json" {
            inventory(path, params, &pages, 20)
        } else if path.starts_with("/grapher/chart-") {
            (200, "Entity,Code,Year,v\nWorld,OWID_WRL,2020,1\n".to_string())
        } else {
            (404, String::new())
        }
    })
    .await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(ScanSettings {
        workers: 4,
        page_size: 100,
        ..settings(&server, tmp.path())
    })
    .unwrap();

    let rows = scanner.run().await.unwrap().rows;
    let ids: Vec<u32> = rows.iter().map(|r| r.chart_id.parse().unwrap()).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    assert!(rows.iter().all(|r| r.single_year_data == SingleYear::Yes));
    for i in 1..=20 {
        assert_eq!(server.hits(&format!("/grapher/chart-{}.csv", i)), 1);
    }
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_fetch() {
    let server = spawn_server(|path, _| match path {
        "/grapher/shared.csv" => (200, "Entity,Year\nA,1999\nB,2004\n".to_string()),
        _ => (404, String::new()),
    })
    .await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(settings(&server, tmp.path())).unwrap();

    let results = join_all((0..8).map(|_| scanner.years().export_years("shared"))).await;
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].years.len(), 2);
    assert_eq!(server.hits("/grapher/shared.csv"), 1);
    assert_eq!(scanner.years().network_fetches(), 1);
}

#[tokio::test]
async fn test_inventory_failure_is_fatal() {
    let server = spawn_server(|_, _| (500, "boom".to_string())).await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(settings(&server, tmp.path())).unwrap();
    assert!(scanner.run().await.is_err());
}

#[tokio::test]
async fn test_later_page_failure_keeps_partial_inventory() {
    let server = spawn_server(|path, params| {
        if path != "/owid.json" {
            return (404, String::new());
        }
        match offset_of(params) {
            Some(2) => (500, "boom".to_string()),
            _ => inventory(path, params, &sample_pages(), 5),
        }
    })
    .await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(ScanSettings {
        fetch_years: false,
        ..settings(&server, tmp.path())
    })
    .unwrap();

    let outcome = scanner.run().await.unwrap();
    assert!(!outcome.inventory_complete);
    assert_eq!(outcome.rows.len(), 2);
    // no exports were requested with years disabled
    assert_eq!(scanner.years().network_fetches(), 0);
    assert_eq!(outcome.rows[1].single_year_data, SingleYear::Yes);
    assert_eq!(outcome.rows[0].single_year_data, SingleYear::Unknown);
}

#[tokio::test]
async fn test_limit_truncates_inventory() {
    let server = spawn_server(sample_routes).await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(ScanSettings {
        limit: Some(1),
        fetch_years: false,
        ..settings(&server, tmp.path())
    })
    .unwrap();
    let outcome = scanner.run().await.unwrap();
    assert_eq!(outcome.inventory_size, 4);
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].slug, "population-with-un-projections");
}

#[tokio::test]
async fn test_legacy_csv_inventory_with_html_probe() {
    let server = spawn_server(|path, params| match path {
        "/owid.json" if param(params, "sql").map_or(false, |s| s.contains("count(id)")) => {
            (500, "no count here".to_string())
        }
        "/owid.json" if offset_of(params) == Some(0) => (
            200,
            json!({"csv": "id,slug,title,type,isPublished\n8903,most-common-religion,Religion,WorldMap,True\n8911,trust-another-religion,Trust,LineChart,True\n"})
                .to_string(),
        ),
        "/owid.json" => (200, json!({"rows": []}).to_string()),
        "/grapher/most-common-religion" => (
            200,
            r#"<html><script>window.config = {"hasMapTab":true}</script></html>"#.to_string(),
        ),
        "/grapher/trust-another-religion" => (200, "<html><body>chart</body></html>".to_string()),
        _ => (404, String::new()),
    })
    .await;
    let tmp = tempdir().unwrap();
    let scanner = Scanner::new(ScanSettings {
        html_probe: true,
        fetch_years: false,
        ..settings(&server, tmp.path())
    })
    .unwrap();

    let rows = scanner.run().await.unwrap().rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].has_map_tab, YesNo::Yes);
    assert!(rows[0].url.ends_with("?tab=map"));
    assert_eq!(rows[1].has_map_tab, YesNo::No);
    assert_eq!(server.hits("/grapher/most-common-religion"), 1);
}
