use criterion::{Criterion, criterion_group, criterion_main};
use std::fmt::Write;
use std::hint::black_box;
use storefront_rag::crawler::extract_text;
use storefront_rag::embeddings::chunking::{ChunkingConfig, chunk_text};

fn storefront_page(sections: usize) -> String {
    let mut html = String::from(
        "<html><head><title>Corner Ceramics</title><style>p { margin: 0; }</style></head><body>\
         <header><nav><a href=\"/\">Home</a><a href=\"/shop\">Shop</a></nav></header><main>",
    );
    for i in 0..sections {
        let _ = write!(
            html,
            "<h2>Collection {i}</h2><p>Every piece in collection {i} is thrown by hand, \
             glazed in small batches and fired twice. Sizes vary slightly between pieces.</p>\
             <ul><li>Stoneware</li><li>Dishwasher safe</li><li>Price from {i}.50</li></ul>"
        );
    }
    html.push_str("</main><footer>Copyright</footer></body></html>");
    html
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let page = storefront_page(200);
    let text = extract_text(&page).text;
    let config = ChunkingConfig::default();

    c.bench_function("extraction", |b| b.iter(|| extract_text(black_box(&page))));
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
