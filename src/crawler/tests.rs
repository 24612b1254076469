use super::validate_url as validate_url_impl;
use super::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOMEPAGE: &str = r##"
    <html>
        <body>
            <header>
                <a href="/about">About</a>
                <a href="https://shop.example/contact">Contact</a>
            </header>
            <div class="main-menu">
                <a href="/products">Products</a>
                <a href="/products#top">Jump</a>
                <a href="mailto:hello@shop.example">Mail</a>
            </div>
            <ul id="navigation-links"><li><a href="/about">About again</a></li></ul>
            <main><a href="/blog/post-1">Not navigation</a></main>
        </body>
    </html>
"##;

#[test]
fn validate_url() {
    assert!(validate_url_impl("https://example.com").is_ok());
    assert!(validate_url_impl("  http://shop.example/store  ").is_ok());

    assert!(validate_url_impl("ftp://example.com").is_err());
    assert!(validate_url_impl("not-a-url").is_err());
    assert!(validate_url_impl("").is_err());
}

#[test]
fn navigation_links_are_collected() {
    let homepage = Url::parse("https://shop.example/").expect("url should parse");

    let urls = extract_nav_urls(HOMEPAGE, &homepage).expect("extraction should succeed");

    let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();
    assert_eq!(
        urls,
        vec![
            "https://shop.example/",
            "https://shop.example/about",
            "https://shop.example/contact",
            "https://shop.example/products",
        ]
    );
}

#[test]
fn page_without_navigation_yields_homepage() {
    let homepage = Url::parse("https://shop.example/").expect("url should parse");

    let urls = extract_nav_urls("<p>Coming soon</p>", &homepage).expect("extraction should succeed");

    assert_eq!(urls, vec![homepage]);
}

#[tokio::test(flavor = "multi_thread")]
async fn discover_fetches_homepage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HOMEPAGE))
        .expect(1)
        .mount(&server)
        .await;

    let homepage = Url::parse(&server.uri()).expect("url should parse");
    let urls = tokio::task::spawn_blocking(move || discover(&HttpFetcher::default(), &homepage))
        .await
        .expect("blocking task should join")
        .expect("discovery should succeed");

    assert!(urls.iter().any(|url| url.path() == "/products"));
}

#[tokio::test(flavor = "multi_thread")]
async fn http_errors_surface() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/missing", server.uri())).expect("url should parse");
    let result = tokio::task::spawn_blocking(move || HttpFetcher::default().fetch(&url))
        .await
        .expect("blocking task should join");

    let err = result.expect_err("404 should fail");
    assert!(err.to_string().contains("404"));
}
