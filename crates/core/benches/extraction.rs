use clipmark_core::{ExtractConfig, extract, ingest, sanitize};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn synthetic_article(paragraphs: usize) -> String {
    let mut body = String::from(
        "<html><head><title>Benchmark Article</title></head><body>\
         <nav><a href=\"/\">Home</a><a href=\"/tags\">Tags</a></nav>\
         <article><h1>Benchmark Article</h1>",
    );
    for i in 0..paragraphs {
        body.push_str(&format!(
            "<p>Paragraph {} carries a handful of sentences so the extractor has realistic \
             prose to walk. It mentions <a href=\"/ref/{}\">a relative link</a> and keeps going \
             long enough to look like writing someone actually published.</p>",
            i, i
        ));
    }
    body.push_str("</article><footer>© nobody</footer></body></html>");
    body
}

fn bench_extract(c: &mut Criterion) {
    let small = synthetic_article(5);
    let medium = synthetic_article(50);
    let large = synthetic_article(500);
    let config = ExtractConfig::default();

    let mut group = c.benchmark_group("extract");

    group.bench_with_input(BenchmarkId::new("small", "5p"), &small, |b, html| {
        b.iter(|| extract(black_box(html), None, &config))
    });

    group.bench_with_input(BenchmarkId::new("medium", "50p"), &medium, |b, html| {
        b.iter(|| extract(black_box(html), None, &config))
    });

    group.bench_with_input(BenchmarkId::new("large", "500p"), &large, |b, html| {
        b.iter(|| extract(black_box(html), None, &config))
    });

    group.finish();
}

fn bench_clean_region(c: &mut Criterion) {
    let html = synthetic_article(50);

    c.bench_function("clean_region", |b| {
        b.iter(|| sanitize::clean_region(black_box(&html), None))
    });
}

fn bench_markdown_ingest(c: &mut Criterion) {
    let markdown = "# Title\n\nSome **bold** prose with a [link](https://example.org).\n\n\
                    - item one\n- item two\n\n> a quote\n\n```\ncode block\n```\n\n"
        .repeat(50);

    c.bench_function("markdown_ingest", |b| {
        b.iter(|| ingest::markdown_to_html(black_box(&markdown)))
    });
}

criterion_group!(benches, bench_extract, bench_clean_region, bench_markdown_ingest);
criterion_main!(benches);
