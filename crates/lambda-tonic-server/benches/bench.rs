use bytes::Bytes;
use core::{fmt, hint::black_box};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use lambda_tonic_core::proto::{
    Image, InferImageRequest, JobDescriptor, lambda_client::LambdaClient,
};

use futures::stream::FuturesUnordered;
use std::{
    net::TcpStream,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tokio::runtime::Builder;
use tokio_stream::StreamExt;
use tonic::{
    codec::CompressionEncoding,
    transport::{Channel, Uri},
};

#[derive(Clone, Copy, Debug)]
enum Compression {
    None,
    Deflate,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Deflate => write!(f, "deflate"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Deflate => Some(CompressionEncoding::Deflate),
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct GrpcBenchParams {
    chunks: usize,
    images_per_chunk: usize,
    image_bytes: usize,
    concurrency: usize,
    compression: Compression,
}

fn grpc_bench(c: &mut Criterion) {
    let uri = Uri::try_from("http://0.0.0.0:50051").expect("Invalid URI");
    // Start the server. This may require a full compilation so set the timeout
    // high. Adjust features and CLI args to the server as necessary.
    let mut server = Command::new("cargo")
        .args([
            "run",
            "--bin",
            "lambda-tonic-server",
            "--release",
            "--features",
            "tracing",
            "--",
            "--num-workers",
            "32",
        ])
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to start lambda-tonic-server");
    wait_for_port(uri.authority().expect("missing authority").as_str(), 300);

    let chunk_cases = [1, 16, 128];
    let images_per_chunk_cases = [1, 8];
    let image_bytes_cases = [1024, 64 * 1024];
    let concurrency_cases = [1, 8, 32];
    let compression_cases = [Compression::None, Compression::Zstd, Compression::Gzip];

    // Generate cartesian product of all param combinations
    let mut cases = Vec::new();
    for &chunks in &chunk_cases {
        for &images_per_chunk in &images_per_chunk_cases {
            for &image_bytes in &image_bytes_cases {
                for &concurrency in &concurrency_cases {
                    for &compression in &compression_cases {
                        cases.push(GrpcBenchParams {
                            chunks,
                            images_per_chunk,
                            image_bytes,
                            concurrency,
                            compression,
                        });
                    }
                }
            }
        }
    }
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    for params in &cases {
        let mut group = c.benchmark_group("grpc/infer_image");
        group.throughput(Throughput::Elements(
            (params.chunks * params.images_per_chunk * params.concurrency) as u64,
        ));

        group.bench_function(
            format!(
                "chunks/{}/imgs/{}/bytes/{}/conc/{}/comp/{}",
                params.chunks,
                params.images_per_chunk,
                params.image_bytes,
                params.concurrency,
                params.compression,
            ),
            |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let uri = uri.clone();
                    async move {
                        let channel = Channel::builder(uri)
                            .connect()
                            .await
                            .expect("Failed to connect to server");

                        let start = Instant::now();

                        for _ in 0..iters {
                            run_grpc_infer_bench(&channel, params).await;
                        }

                        start.elapsed()
                    }
                });
            },
        );

        group.finish();
    }

    if server.kill().is_err() {
        eprintln!("failed to kill server");
    }
}

fn build_chunks(params: &GrpcBenchParams) -> Vec<InferImageRequest> {
    let payload = Bytes::from(vec![0xA5; params.image_bytes]);
    let job = JobDescriptor {
        name: "bench".to_string(),
        version: "v1".to_string(),
    };

    (0..params.chunks)
        .map(|chunk| InferImageRequest {
            job: Some(job.clone()),
            images: (0..params.images_per_chunk)
                .map(|i| Image {
                    name: format!("image-{}", chunk * params.images_per_chunk + i),
                    data: payload.clone(),
                })
                .collect(),
        })
        .collect()
}

async fn run_grpc_infer_bench(channel: &Channel, params: &GrpcBenchParams) {
    let concurrent_requests = params.concurrency;
    let expected = params.chunks * params.images_per_chunk;
    let mut tasks = FuturesUnordered::new();

    for _ in 0..concurrent_requests {
        let channel = channel.clone();
        let compression = params.compression;
        let chunks = build_chunks(params);

        tasks.push(tokio::spawn(async move {
            let mut client = LambdaClient::new(channel).max_decoding_message_size(usize::MAX);
            if let Some(encoding) = compression.into() {
                client = client.accept_compressed(encoding).send_compressed(encoding)
            }

            let response = client
                .infer_image(tokio_stream::iter(chunks))
                .await
                .expect("infer call failed")
                .into_inner();

            assert_eq!(
                response.outputs.len(),
                expected,
                "Corrupt response: one output per image expected"
            );
            for output in response.outputs {
                black_box(output);
            }
        }));
    }

    // Wait for all tasks to complete
    while let Some(res) = tasks.next().await {
        res.unwrap();
    }
}

pub fn wait_for_port(addr: &str, timeout_secs: u64) {
    let start = Instant::now();
    while start.elapsed().as_secs() < timeout_secs {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Server did not start listening on {}", addr);
}

criterion_group!(grpc_benches, grpc_bench);
criterion_main!(grpc_benches);
