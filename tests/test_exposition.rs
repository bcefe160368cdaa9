use gpfs_exporter::collector::*;
use gpfs_exporter::config::{CollectorKind, ExporterConfig};
use gpfs_exporter::error::ExporterError;
use gpfs_exporter::exposition::*;
use gpfs_exporter::runner::{CommandRunner, FakeRunner};

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use clap::Parser;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const MMPMON_STDOUT: &str = "
_fs_io_s_ _n_ 10.22.0.106 _nn_ ib-pitzer-rw02.ten _rc_ 0 _t_ 1579358234 _tu_ 53212 _cl_ gpfs.osc.edu _fs_ scratch _d_ 48 _br_ 205607400434 _bw_ 74839282351 _oc_ 2377656 _cc_ 2201576 _rdc_ 59420404 _wc_ 18874626 _dir_ 40971 _iu_ 544768
_fs_io_s_ _n_ 10.22.0.106 _nn_ ib-pitzer-rw02.ten _rc_ 0 _t_ 1579358234 _tu_ 53212 _cl_ gpfs.osc.edu _fs_ project _d_ 96 _br_ 0 _bw_ 0 _oc_ 513 _cc_ 513 _rdc_ 0 _wc_ 0 _dir_ 0 _iu_ 169
";

    const EXPECTED_PERF: &str = r#"# HELP gpfs_perf_operations GPFS operations reported by mmpmon
# TYPE gpfs_perf_operations counter
gpfs_perf_operations{fs="project",nodename="ib-pitzer-rw02.ten",operation="closes"} 513
gpfs_perf_operations{fs="project",nodename="ib-pitzer-rw02.ten",operation="inode_updates"} 169
gpfs_perf_operations{fs="project",nodename="ib-pitzer-rw02.ten",operation="opens"} 513
gpfs_perf_operations{fs="project",nodename="ib-pitzer-rw02.ten",operation="read_dir"} 0
gpfs_perf_operations{fs="project",nodename="ib-pitzer-rw02.ten",operation="reads"} 0
gpfs_perf_operations{fs="project",nodename="ib-pitzer-rw02.ten",operation="writes"} 0
gpfs_perf_operations{fs="scratch",nodename="ib-pitzer-rw02.ten",operation="closes"} 2201576
gpfs_perf_operations{fs="scratch",nodename="ib-pitzer-rw02.ten",operation="inode_updates"} 544768
gpfs_perf_operations{fs="scratch",nodename="ib-pitzer-rw02.ten",operation="opens"} 2377656
gpfs_perf_operations{fs="scratch",nodename="ib-pitzer-rw02.ten",operation="read_dir"} 40971
gpfs_perf_operations{fs="scratch",nodename="ib-pitzer-rw02.ten",operation="reads"} 59420404
gpfs_perf_operations{fs="scratch",nodename="ib-pitzer-rw02.ten",operation="writes"} 18874626
# HELP gpfs_perf_read_bytes GPFS read bytes
# TYPE gpfs_perf_read_bytes counter
gpfs_perf_read_bytes{fs="project",nodename="ib-pitzer-rw02.ten"} 0
gpfs_perf_read_bytes{fs="scratch",nodename="ib-pitzer-rw02.ten"} 205607400434
# HELP gpfs_perf_write_bytes GPFS write bytes
# TYPE gpfs_perf_write_bytes counter
gpfs_perf_write_bytes{fs="project",nodename="ib-pitzer-rw02.ten"} 0
gpfs_perf_write_bytes{fs="scratch",nodename="ib-pitzer-rw02.ten"} 74839282351
"#;

    /// Helper function to build a gatherer with one fake runner per collector.
    fn gatherer(mmpmon: Arc<FakeRunner>, verbs: Arc<FakeRunner>, use_cache: bool) -> Gatherer {
        let timeout = Duration::from_secs(5);
        let mut gatherer = Gatherer::new();
        gatherer
            .register(Arc::new(Collector::new(MmpmonSource, mmpmon, timeout, use_cache)))
            .unwrap();
        gatherer
            .register(Arc::new(Collector::new(VerbsSource, verbs, timeout, use_cache)))
            .unwrap();
        gatherer
    }

    /// Helper function to keep only the lines of the named families.
    fn lines_of(text: &str, prefix: &str) -> String {
        text.lines()
            .filter(|l| {
                l.starts_with(prefix)
                    || l.starts_with(&format!("# HELP {}", prefix))
                    || l.starts_with(&format!("# TYPE {}", prefix))
            })
            .map(|l| format!("{}\n", l))
            .collect()
    }

    #[tokio::test]
    async fn test_render_perf_families() {
        let gatherer = gatherer(
            Arc::new(FakeRunner::succeeding(MMPMON_STDOUT)),
            Arc::new(FakeRunner::succeeding("VERBS RDMA status: started\n")),
            false,
        );
        let text = gatherer.render().await.unwrap();
        assert_eq!(lines_of(&text, "gpfs_perf_"), EXPECTED_PERF);
        assert!(text.contains("# TYPE gpfs_verbs_status gauge\ngpfs_verbs_status 1\n"));
    }

    #[tokio::test]
    async fn test_meta_families_are_merged() {
        let gatherer = gatherer(
            Arc::new(FakeRunner::succeeding(MMPMON_STDOUT)),
            Arc::new(FakeRunner::failing("Error")),
            false,
        );
        let families = gatherer.gather().await;

        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(!names.contains(&"gpfs_verbs_status"));

        let text = gatherer.render().await.unwrap();
        let errors = lines_of(&text, COLLECT_ERROR);
        assert_eq!(
            errors,
            "# HELP gpfs_exporter_collect_error Indicates if error has occurred during collection\n\
             # TYPE gpfs_exporter_collect_error gauge\n\
             gpfs_exporter_collect_error{collector=\"mmpmon\"} 0\n\
             gpfs_exporter_collect_error{collector=\"verbs\"} 1\n"
        );
        assert_eq!(text.matches("# TYPE gpfs_exporter_collect_timeout gauge").count(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let runner: Arc<dyn CommandRunner> = Arc::new(FakeRunner::succeeding(""));
        let mut gatherer = Gatherer::new();
        let timeout = Duration::from_secs(1);
        gatherer
            .register(Arc::new(Collector::new(VerbsSource, runner.clone(), timeout, false)))
            .unwrap();
        let err = gatherer
            .register(Arc::new(Collector::new(VerbsSource, runner, timeout, false)))
            .unwrap_err();
        assert!(matches!(err, ExporterError::DuplicateCollector(name) if name == "verbs"));
        assert_eq!(gatherer.collectors().len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let gatherer = gatherer(
            Arc::new(FakeRunner::succeeding(MMPMON_STDOUT)),
            Arc::new(FakeRunner::timing_out()),
            false,
        );
        let response = router(Arc::new(gatherer))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("gpfs_exporter_collect_timeout{collector=\"verbs\"} 1"));
        assert!(text.contains("gpfs_exporter_collect_timeout{collector=\"mmpmon\"} 0"));
        assert!(text.contains(
            "gpfs_perf_read_bytes{fs=\"scratch\",nodename=\"ib-pitzer-rw02.ten\"} 205607400434"
        ));
    }

    #[tokio::test]
    async fn test_landing_page() {
        let gatherer = gatherer(
            Arc::new(FakeRunner::succeeding("")),
            Arc::new(FakeRunner::succeeding("")),
            false,
        );
        let response = router(Arc::new(gatherer))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("/metrics"));
    }

    #[tokio::test]
    async fn test_cache_endpoints() {
        let verbs = Arc::new(FakeRunner::succeeding("VERBS RDMA status: started\n"));
        let gatherer = Arc::new(gatherer(
            Arc::new(FakeRunner::succeeding(MMPMON_STDOUT)),
            verbs.clone(),
            true,
        ));
        gatherer.gather().await;
        let app = router(Arc::clone(&gatherer));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/-/cache").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let state: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(state[0]["collector"], "mmpmon");
        assert_eq!(state[0]["populated"], true);
        assert_eq!(state[1]["collector"], "verbs");
        assert_eq!(state[1]["enabled"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/-/cache/clear")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let cleared: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(cleared["cleared"], serde_json::json!(["mmpmon", "verbs"]));

        verbs.respond(Err(gpfs_exporter::error::RunnerError::Execution("Error".into())));
        let text = gatherer.render().await.unwrap();
        assert!(!text.contains("gpfs_verbs_status"));
        assert!(text.contains("gpfs_exporter_collect_error{collector=\"verbs\"} 1"));
    }

    #[test]
    fn test_config_defaults() {
        let config = ExporterConfig::try_parse_from(["gpfs_exporter"]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9303");
        assert_eq!(config.enabled_collectors(), vec![CollectorKind::Mmpmon]);
        assert!(!config.use_cache);
        assert_eq!(config.sudo(), Some("sudo".to_string()));
        assert_eq!(config.timeout_for(CollectorKind::Mmpmon), Duration::from_secs(5));
    }

    #[test]
    fn test_config_flags() {
        let config = ExporterConfig::try_parse_from([
            "gpfs_exporter",
            "--collectors",
            "verbs,mmpmon,verbs",
            "--use-cache",
            "--sudo-command",
            "",
            "--verbs-timeout",
            "2",
        ])
        .unwrap();
        assert_eq!(
            config.enabled_collectors(),
            vec![CollectorKind::Verbs, CollectorKind::Mmpmon]
        );
        assert!(config.use_cache);
        assert_eq!(config.sudo(), None);
        assert_eq!(config.timeout_for(CollectorKind::Verbs), Duration::from_secs(2));
    }

    #[test]
    fn test_build_collectors() {
        let config = ExporterConfig::try_parse_from([
            "gpfs_exporter",
            "--collectors",
            "mmpmon,verbs",
            "--use-cache",
        ])
        .unwrap();
        let collectors = build_collectors(&config, Arc::new(FakeRunner::succeeding("")));
        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["mmpmon", "verbs"]);
        assert!(collectors.iter().all(|c| c.cache_state().enabled));
    }

    #[test]
    fn test_config_rejects_unknown_collector() {
        assert!(
            ExporterConfig::try_parse_from(["gpfs_exporter", "--collectors", "mmhealth"]).is_err()
        );
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        for flag in ["--mmpmon-timeout", "--verbs-timeout"] {
            assert!(ExporterConfig::try_parse_from(["gpfs_exporter", flag, "0"]).is_err());
        }
        let config =
            ExporterConfig::try_parse_from(["gpfs_exporter", "--verbs-timeout", "1"]).unwrap();
        assert_eq!(config.timeout_for(CollectorKind::Verbs), Duration::from_secs(1));
    }
}
