use std::sync::Arc;

use railnet_routing::{
    BezierPoint, GraphState, NetworkConfig, QueryError, RailNetwork, Station, TrackSegment, Vec3,
};

fn v(x: f64, z: f64) -> Vec3 {
    Vec3::new(x, 0.0, z)
}

/// Square loop plus a one-point spur, passed through JSON the way a track
/// source hands it over. The east side starts 0.05 off the corner, so it only
/// joins the loop through endpoint merging.
fn square_loop() -> Vec<TrackSegment> {
    let tracks = vec![
        TrackSegment::straight("south", v(0.0, 0.0), v(100.0, 0.0)),
        TrackSegment::straight("east", v(100.05, 0.0), v(100.0, 100.0)),
        TrackSegment::straight("north", v(100.0, 100.0), v(0.0, 100.0)),
        TrackSegment::straight("west", v(0.0, 100.0), v(0.0, 0.0)),
        TrackSegment::new("spur", vec![BezierPoint::linear(v(0.0, 0.0))]),
    ];
    let json = serde_json::to_string(&tracks).expect("serialize tracks");
    serde_json::from_str(&json).expect("valid track json")
}

fn corner_stations() -> Vec<Station> {
    vec![
        Station::new("sw", v(0.0, 0.0)),
        Station::new("se", v(100.0, 0.0)),
        Station::new("ne", v(100.0, 100.0)),
    ]
}

#[tokio::test]
async fn test_background_build_reaches_built() {
    let network = Arc::new(RailNetwork::new(NetworkConfig::default()));

    let handle = network
        .try_build(square_loop(), corner_stations())
        .expect("first build starts");
    let state = handle.await.expect("build task");
    assert_eq!(state, GraphState::Built);
    assert_eq!(network.state(), GraphState::Built);

    let stats = network.build_stats().expect("stats");
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.edges, 8);
    assert_eq!(stats.skipped_segments, 1);

    // Graph totals: sw-se 100, se-ne 100, sw-ne 200.
    // Straight: 100, 100, 100*sqrt(2).
    let expected = (200.0 + 100.0 * 2f64.sqrt()) / 400.0;
    assert!((network.scaling_factor() - expected).abs() < 1e-3);

    let stations = corner_stations();
    let forward = network.distance_between(&stations[0], &stations[2]).expect("path");
    let backward = network.distance_between(&stations[2], &stations[0]).expect("path");
    assert_eq!(forward, backward);
    assert!((forward - 200.0 * network.scaling_factor()).abs() < 1e-3);
}

#[tokio::test]
async fn test_second_trigger_is_noop() {
    let network = Arc::new(RailNetwork::new(NetworkConfig::default()));

    let first = network.try_build(square_loop(), corner_stations());
    let second = network.try_build(square_loop(), corner_stations());
    assert!(first.is_some());
    assert!(second.is_none());

    first.expect("handle").await.expect("build task");
    assert!(network.try_build(square_loop(), corner_stations()).is_none());
}

#[tokio::test]
async fn test_concurrent_triggers_start_one_build() {
    let network = Arc::new(RailNetwork::new(NetworkConfig::default()));

    let mut triggers = Vec::new();
    for _ in 0..8 {
        let network = Arc::clone(&network);
        triggers.push(tokio::spawn(async move {
            network.try_build(square_loop(), corner_stations())
        }));
    }

    let mut started = Vec::new();
    for trigger in triggers {
        if let Some(handle) = trigger.await.expect("trigger task") {
            started.push(handle);
        }
    }
    assert_eq!(started.len(), 1);

    for handle in started {
        assert_eq!(handle.await.expect("build task"), GraphState::Built);
    }
}

#[tokio::test]
async fn test_clear_allows_rebuild() {
    let network = Arc::new(RailNetwork::new(NetworkConfig::default()));
    network
        .try_build(square_loop(), corner_stations())
        .expect("start")
        .await
        .expect("build task");

    network.clear();
    assert_eq!(network.state(), GraphState::Uninitialized);
    assert!(network.service().is_none());
    assert_eq!(network.scaling_factor(), 1.0);

    let stations = corner_stations();
    assert_eq!(
        network.distance_between(&stations[0], &stations[1]),
        Err(QueryError::Unavailable(GraphState::Uninitialized))
    );

    let state = network
        .try_build(square_loop(), corner_stations())
        .expect("rebuild starts")
        .await
        .expect("build task");
    assert_eq!(state, GraphState::Built);

    // Fresh cycle, fresh caches
    let service = network.service().expect("service");
    assert!(service.pathfinder().traversal_count() > 0);
    assert_eq!(service.nearest_cache().len(), 3);
}

#[tokio::test]
async fn test_unreachable_station_makes_build_faulty() {
    let network = Arc::new(RailNetwork::new(NetworkConfig::default()));
    let mut tracks = square_loop();
    tracks.push(TrackSegment::straight("island", v(1000.0, 1000.0), v(1010.0, 1000.0)));
    let mut stations = corner_stations();
    stations.push(Station::new("far", v(1005.0, 1000.0)));

    let state = network
        .try_build(tracks, stations.clone())
        .expect("start")
        .await
        .expect("build task");
    assert_eq!(state, GraphState::Faulty);
    assert!(network.service().is_none());

    // Queries fall back to the straight line
    let d = network.distance_or_fallback(&stations[0], &stations[2]);
    assert!((d - 100.0 * 2f64.sqrt()).abs() < 1e-9);
}

#[tokio::test]
async fn test_parallel_queries_agree() {
    let network = Arc::new(RailNetwork::new(NetworkConfig {
        precompute_station_distances: false,
        calibrate: false,
        ..NetworkConfig::default()
    }));
    network
        .try_build(square_loop(), corner_stations())
        .expect("start")
        .await
        .expect("build task");

    let mut queries = Vec::new();
    for _ in 0..16 {
        let network = Arc::clone(&network);
        queries.push(tokio::spawn(async move {
            let stations = corner_stations();
            network.distance_between(&stations[1], &stations[0])
        }));
    }

    for query in queries {
        let d = query.await.expect("query task").expect("path");
        assert!((d - 100.0).abs() < 1e-3);
    }
}
