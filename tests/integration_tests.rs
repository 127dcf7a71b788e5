use bytes::Bytes;
use segmented_retrieval::{
    test_helpers::{
        encrypt_parts, fixture, package, package_key, random_bytes, RecordingProgress,
        SegmentServer,
    },
    AesPartCipher, CancellationToken, DecryptionKey, DirectoryInfo, Error, FileInfo, PartCipher,
    Result, RetrievalConfig, SegmentedRetrieval, DECRYPTING, DOWNLOADING, WRITING,
};
use std::{
    fs,
    io::Read,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;

// Keeps the checksum derivation cheap; the cost parameter is not under test here.
fn config() -> RetrievalConfig {
    RetrievalConfig::default()
        .with_checksum_iterations(4)
        .with_segment_size(8 * 1024)
}

fn read_all(mut reader: impl Read) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    let _ = reader.read_to_end(&mut content)?;
    Ok(content)
}

fn dir_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn assert_stage_completes(recorder: &RecordingProgress, stage: &str) {
    let values = recorder.stage(stage);
    assert!(!values.is_empty(), "no {stage} updates");
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "{stage} went backwards: {values:?}"
    );
    assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
    assert_eq!(values.last(), Some(&100.0), "{stage} did not finish");
}

/// Wraps the AES cipher and counts checksum derivations.
#[derive(Default)]
struct CountingCipher {
    derivations: AtomicUsize,
}

impl PartCipher for CountingCipher {
    fn derive_checksum(&self, key_code: &str, package_code: &str, iterations: u32) -> Result<String> {
        let _ = self.derivations.fetch_add(1, Ordering::SeqCst);
        AesPartCipher.derive_checksum(key_code, package_code, iterations)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &DecryptionKey) -> Result<Bytes> {
        AesPartCipher.decrypt(ciphertext, key)
    }
}

#[test]
fn output_matches_plaintext_whatever_the_completion_order() -> Result<()> {
    for parts in [1, 2, 8] {
        let part_size = 3_000;
        let size = part_size * parts - 123;
        let (package, plaintext, server) = fixture("file", size, part_size)?;
        let server = server.with_jitter(Duration::from_millis(5));

        for window in [1, 3, 16] {
            let engine = SegmentedRetrieval::new(&server, AesPartCipher, package.clone())
                .with_config(config().with_max_workers(4).with_parts_per_batch(window));
            let stream = engine.download_stream("file")?;
            assert_eq!(stream.len(), size as u64);
            assert_eq!(read_all(stream)?, plaintext.to_vec(), "{parts} parts, window {window}");
        }
    }
    Ok(())
}

#[test]
fn file_variant_writes_the_plaintext() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, plaintext, server) = fixture("doc", 100_000, 7_000)?;
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_config(config().with_max_workers(3));

    let output = dir.path().join("doc.out");
    let written = engine.download_file("doc", &output)?;

    assert_eq!(written, output);
    assert_eq!(fs::read(&output)?, plaintext.to_vec());
    assert_eq!(dir_entries(dir.path())?, vec!["doc.out".to_string()]);
    Ok(())
}

#[test]
fn file_variant_replaces_an_existing_file() -> Result<()> {
    let dir = TempDir::new()?;
    let output = dir.path().join("doc.out");
    fs::write(&output, vec![0xAA; 500_000])?;

    let (package, plaintext, server) = fixture("doc", 20_000, 6_000)?;
    let _ = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_config(config())
        .download_file("doc", &output)?;

    assert_eq!(fs::read(&output)?, plaintext.to_vec());
    Ok(())
}

#[test]
fn download_to_dir_uses_the_file_name() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, plaintext, server) = fixture("abc", 5_000, 1_000)?;
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package).with_config(config());

    let path = engine.download_file_to_dir("abc", dir.path())?;
    assert_eq!(path, dir.path().join("abc.bin"));
    assert_eq!(fs::read(&path)?, plaintext.to_vec());
    Ok(())
}

#[test]
fn stream_variant_is_rewound_and_sized() -> Result<()> {
    let (package, plaintext, server) = fixture("blob", 200_000, 65_536)?;
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package).with_config(config());

    let mut stream = engine.download_stream("blob")?;
    assert_eq!(stream.position(), 0);
    assert_eq!(stream.len(), plaintext.len() as u64);

    let mut first = [0u8; 10];
    stream.read_exact(&mut first)?;
    assert_eq!(first[..], plaintext[..10]);
    Ok(())
}

#[test]
fn failing_part_leaves_no_output() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, _, server) = fixture("doc", 40_000, 4_000)?;
    let server = server.failing_on(7);
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_config(config().with_max_workers(4).with_parts_per_batch(4));

    let output = dir.path().join("doc.out");
    let result = engine.download_file("doc", &output);

    assert!(matches!(result, Err(Error::Transport(_))), "{result:?}");
    assert!(!output.exists());
    assert!(dir_entries(dir.path())?.is_empty());
    // The failure lands in the second batch; nothing past it is requested.
    assert!(server.requests().iter().all(|(_, request)| request.part <= 8));

    assert!(matches!(
        engine.download_stream("doc"),
        Err(Error::Transport(_))
    ));
    Ok(())
}

#[test]
fn corrupt_part_fails_with_decryption_error() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, _, mut server) = fixture("doc", 10_000, 2_000)?;
    server.replace_part(3, random_bytes(15));
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package).with_config(config());

    let output = dir.path().join("doc.out");
    assert!(matches!(
        engine.download_file("doc", &output),
        Err(Error::Decryption(_))
    ));
    assert!(dir_entries(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn unreservable_part_buffer_fails_with_allocation_error() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, _, server) = fixture("doc", 10_000, 1_000)?;
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_config(config().with_segment_size(usize::MAX));

    let output = dir.path().join("doc.out");
    let result = engine.download_file("doc", &output);
    assert!(matches!(result, Err(Error::Allocation(_))), "{result:?}");
    assert!(!output.exists());
    assert!(dir_entries(dir.path())?.is_empty());

    assert!(matches!(
        engine.download_stream("doc"),
        Err(Error::Allocation(_))
    ));
    // The buffer is reserved before the request goes out.
    assert!(server.requests().is_empty());
    Ok(())
}

#[test]
fn unknown_file_is_not_found_and_makes_no_calls() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, _, server) = fixture("doc", 1_000, 100)?;
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package).with_config(config());

    let output = dir.path().join("x");
    assert!(matches!(
        engine.download_file("missing", &output),
        Err(Error::NotFound(id)) if id == "missing"
    ));
    assert!(matches!(
        engine.download_stream("missing"),
        Err(Error::NotFound(_))
    ));
    assert!(server.requests().is_empty());
    assert!(!output.exists());
    Ok(())
}

#[test]
fn checksum_is_derived_once_and_sent_with_every_part() -> Result<()> {
    let (package, plaintext, server) = fixture("doc", 30_000, 2_500)?;
    let expected = AesPartCipher.derive_checksum(&package.key_code, &package.package_code, 4)?;
    let server = server.expecting_checksum(expected.clone());
    let cipher = CountingCipher::default();
    let engine = SegmentedRetrieval::new(&server, &cipher, package)
        .with_config(config().with_parts_per_batch(5));

    assert_eq!(read_all(engine.download_stream("doc")?)?, plaintext.to_vec());
    assert_eq!(cipher.derivations.load(Ordering::SeqCst), 1);

    let requests = server.requests();
    assert_eq!(requests.len(), 12);
    let mut parts: Vec<_> = requests.iter().map(|(_, request)| request.part).collect();
    parts.sort_unstable();
    assert_eq!(parts, (1..=12).collect::<Vec<_>>());
    for (endpoint, request) in &requests {
        assert_eq!(request.checksum, expected);
        assert_eq!(request.api, "RUST_API");
        assert_eq!(request.password, None);
        assert_eq!(endpoint.path, "/package/pkg-0001/file/doc/download/");
    }
    Ok(())
}

#[test]
fn directory_files_use_the_directory_endpoint() -> Result<()> {
    let plaintext = random_bytes(9_000);
    let package = package(vec![]);
    let parts = encrypt_parts(&plaintext, 4_000, &package_key(&package))?;
    let directory = DirectoryInfo {
        directory_id: "dir-7".to_string(),
        files: vec![FileInfo::new("nested", "nested.txt", 9_000, parts.len())],
    };
    let server = SegmentServer::new(parts);
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_directory(directory)
        .with_password("open sesame")
        .with_config(config());

    assert_eq!(read_all(engine.download_stream("nested")?)?, plaintext.to_vec());
    for (endpoint, request) in server.requests() {
        assert_eq!(
            endpoint.path,
            "/package/pkg-0001/directory/dir-7/file/nested/download/"
        );
        assert_eq!(request.password.as_deref(), Some("open sesame"));
    }
    Ok(())
}

#[test]
fn every_stage_reports_monotonic_progress_to_completion() -> Result<()> {
    let (package, _, server) = fixture("doc", 64_000, 4_000)?;
    let server = server.with_jitter(Duration::from_millis(2));
    let recorder = Arc::new(RecordingProgress::default());
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_progress(recorder.clone())
        .with_config(
            config()
                .with_max_workers(4)
                .with_parts_per_batch(5)
                .with_progress_interval(Duration::ZERO),
        );

    let _ = engine.download_stream("doc")?;

    for stage in [DOWNLOADING, DECRYPTING, WRITING] {
        assert_stage_completes(&recorder, stage);
    }
    assert_eq!(recorder.stage(DECRYPTING).first(), Some(&0.0));
    assert_eq!(recorder.stage(DOWNLOADING).len(), 16);
    Ok(())
}

#[test]
fn empty_file_completes_without_requests() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, _, server) = fixture("empty", 0, 1_000)?;
    let recorder = Arc::new(RecordingProgress::default());
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_progress(recorder.clone())
        .with_config(config());

    let output = engine.download_file("empty", &dir.path().join("empty.out"))?;
    assert_eq!(fs::metadata(&output)?.len(), 0);
    assert!(server.requests().is_empty());
    for stage in [DOWNLOADING, DECRYPTING, WRITING] {
        assert_stage_completes(&recorder, stage);
    }
    Ok(())
}

#[test]
fn concurrency_is_bounded_by_workers_and_window() -> Result<()> {
    let (package, plaintext, server) = fixture("doc", 40_000, 1_000)?;
    let server = server.with_jitter(Duration::from_millis(4));

    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package.clone())
        .with_config(config().with_max_workers(3).with_parts_per_batch(40));
    assert_eq!(read_all(engine.download_stream("doc")?)?, plaintext.to_vec());
    assert!(server.peak_in_flight() <= 3, "{}", server.peak_in_flight());

    let server = SegmentServer::new(encrypt_parts(&plaintext, 1_000, &package_key(&package))?)
        .with_jitter(Duration::from_millis(4));
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_config(config().with_max_workers(8).with_parts_per_batch(2));
    assert_eq!(read_all(engine.download_stream("doc")?)?, plaintext.to_vec());
    assert!(server.peak_in_flight() <= 2, "{}", server.peak_in_flight());
    Ok(())
}

#[test]
fn cancelled_retrieval_fails_and_leaves_no_output() -> Result<()> {
    let dir = TempDir::new()?;
    let (package, _, server) = fixture("doc", 10_000, 1_000)?;
    let token = CancellationToken::new();
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_cancellation(token.clone())
        .with_config(config());

    token.cancel();
    let output = dir.path().join("doc.out");
    assert!(matches!(
        engine.download_file("doc", &output),
        Err(Error::Cancelled)
    ));
    assert!(server.requests().is_empty());
    assert!(dir_entries(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn cancelling_from_the_progress_sink_stops_the_retrieval() -> Result<()> {
    let (package, _, server) = fixture("doc", 50_000, 1_000)?;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let sink = move |stage: &str, percentage: f64| {
        if stage == DOWNLOADING && percentage >= 10.0 {
            trigger.cancel();
        }
    };
    let engine = SegmentedRetrieval::new(&server, AesPartCipher, package)
        .with_cancellation(token)
        .with_progress(Arc::new(sink))
        .with_config(config().with_max_workers(2).with_parts_per_batch(10));

    assert!(matches!(
        engine.download_stream("doc"),
        Err(Error::Cancelled)
    ));
    assert!(server.requests().len() < 50);
    Ok(())
}
