use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use predicates::prelude::*;

static PAGE_JPG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9];

enum Body {
    Html(String),
    Image(&'static [u8]),
    Status(u16, &'static str),
}

/// Serves `routes` (path plus query) until the sender is dropped or signalled; anything else is a 404.
fn spawn_site(routes: HashMap<String, Body>) -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }
        let request = match server.recv_timeout(Duration::from_millis(50)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(_) => break,
        };

        let response = match routes.get(request.url()) {
            Some(Body::Html(html)) => tiny_http::Response::from_string(html.clone()).with_header(
                tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
                    .expect("build header"),
            ),
            Some(Body::Image(bytes)) => tiny_http::Response::from_data(bytes.to_vec()).with_header(
                tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"image/jpeg"[..])
                    .expect("build header"),
            ),
            Some(Body::Status(code, text)) => {
                tiny_http::Response::from_string(*text).with_status_code(*code)
            }
            None => tiny_http::Response::from_string("<html><title>404 Not Found</title></html>")
                .with_status_code(404),
        };
        let _ = request.respond(response);
    });

    (base_url, shutdown_tx, handle)
}

/// Three chapters listed newest first; chapter 2's reader container is gone.
fn mangatown_routes() -> HashMap<String, Body> {
    let mut routes = HashMap::new();
    let items: String = (1..=3)
        .rev()
        .map(|i| format!(r#"<li><a href="/manga/w/c{i:03}/">Chapter {i}</a></li>"#))
        .collect();
    routes.insert(
        "/manga/w".to_string(),
        Body::Html(format!(
            r#"<html><body><img src="/media/logo.png"><ul class="chapter_list">{items}</ul></body></html>"#
        )),
    );
    for i in [1, 3] {
        routes.insert(
            format!("/manga/w/c{i:03}/"),
            Body::Html(format!(
                r#"<html><body><div id="viewer"><img src="/store/c{i}/001.jpg"><img src="/store/c{i}/002.jpg"></div></body></html>"#
            )),
        );
        routes.insert(format!("/store/c{i}/001.jpg"), Body::Image(PAGE_JPG));
        routes.insert(format!("/store/c{i}/002.jpg"), Body::Image(PAGE_JPG));
    }
    routes.insert(
        "/manga/w/c002/".to_string(),
        Body::Html("<html><body><p>This chapter has been licensed.</p></body></html>".to_string()),
    );
    routes
}

/// Two listing pages of two chapters each.
fn novelfull_routes() -> HashMap<String, Body> {
    let mut routes = HashMap::new();
    for (page, chapters) in [(1, 1..=2), (2, 3..=4)] {
        let items: String = chapters
            .map(|i| {
                format!(r#"<li><a href="/w/chapter-{i}.html" title="Chapter {i}: Part {i}">C{i}</a></li>"#)
            })
            .collect();
        routes.insert(
            format!("/w.html?page={page}"),
            Body::Html(format!(
                r#"<html><body><div id="list-chapter"><ul class="list-chapter">{items}</ul>
<ul class="pagination"><li class="last"><a data-page="1" href="/w.html?page=2">Last</a></li></ul></div></body></html>"#
            )),
        );
    }
    for i in 1..=4 {
        routes.insert(
            format!("/w/chapter-{i}.html"),
            Body::Html(format!(
                r#"<html><body><div id="chapter-content"><script>track()</script><div class="ads">buy</div><p>Body of chapter {i}.</p></div></body></html>"#
            )),
        );
    }
    routes
}

fn chapterdl(workdir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chapterdl");
    cmd.current_dir(workdir)
        .env("XDG_CONFIG_HOME", workdir)
        .env_remove("RUST_LOG")
        .args(["--image-delay-ms", "0", "--chapter-delay-ms", "0", "--timeout", "5"]);
    cmd
}

#[test]
fn image_site_skips_broken_chapter_and_writes_the_rest() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_site(mangatown_routes());
    let temp = tempfile::TempDir::new()?;
    let work_url = format!("{base_url}/manga/w");

    chapterdl(temp.path())
        .arg(&work_url)
        .args(["out", "--site", "mangatown", "--fetcher", "http"])
        .args(["--cstart", "0", "--cstop", "2", "--quiet"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipped 1 of 3 chapters"));

    let root = temp.path().join("out");
    assert_eq!(fs::read(root.join("Chapter 1/1.jpg"))?, PAGE_JPG);
    assert!(root.join("Chapter 1/2.jpg").exists());
    assert!(!root.join("Chapter 2").exists());
    assert!(root.join("Chapter 3/2.jpg").exists());

    let info = fs::read_to_string(root.join("info.txt"))?;
    assert!(info.contains(&work_url), "{info}");
    assert!(info.contains("Downloaded by:"), "{info}");

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn explicit_list_with_cbz_and_no_info() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_site(mangatown_routes());
    let temp = tempfile::TempDir::new()?;

    chapterdl(temp.path())
        .arg(format!("{base_url}/manga/w"))
        .args(["out", "--site", "mangatown"])
        .args(["--clist", "2,0", "--cbz", "--no-info", "--quiet"])
        .assert()
        .success();

    let root = temp.path().join("out");
    assert!(root.join("Chapter 3/1.jpg").exists());
    assert!(root.join("Chapter 3.cbz").exists());
    assert!(root.join("Chapter 1.cbz").exists());
    assert!(!root.join("info.txt").exists());

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn text_site_walks_pagination_into_one_html_document() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_site(novelfull_routes());
    let temp = tempfile::TempDir::new()?;

    chapterdl(temp.path())
        .arg(format!("{base_url}/w.html"))
        .args(["novel", "--site", "novelfull"])
        .args(["--cstart", "1", "--html", "--quiet"])
        .assert()
        .success();

    let html = fs::read_to_string(temp.path().join("novel.html"))?;
    assert!(!html.contains("Body of chapter 1."));
    for i in 2..=4 {
        assert!(html.contains(&format!("Body of chapter {i}.")), "{html}");
    }
    assert!(html.contains("<h2>Chapter 2_ Part 2</h2>"), "{html}");
    assert!(!html.contains("track()"));
    assert!(!html.contains("buy"));
    assert_eq!(html.matches("<hr style=\"page-break-before").count(), 2, "{html}");
    assert!(html.contains("Extra metadata"));

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn dry_run_lists_chapters_oldest_first() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_site(mangatown_routes());
    let temp = tempfile::TempDir::new()?;

    chapterdl(temp.path())
        .arg(format!("{base_url}/manga/w"))
        .args(["out", "--site", "mangatown", "--dry-run"])
        .assert()
        .success()
        .stdout("0\t:Chapter 1\n1\t:Chapter 2\n2\t:Chapter 3\n");
    assert!(!temp.path().join("out").exists());

    let output = chapterdl(temp.path())
        .arg(format!("{base_url}/manga/w"))
        .args(["out", "--site", "mangatown"])
        .args(["--dry-run", "--json"])
        .output()?;
    assert!(output.status.success());
    let chapters: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(chapters[2]["title"], "Chapter 3");
    assert_eq!(chapters[2]["index"], 2);

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn missing_work_prints_sentinel_and_exits_2() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_site(HashMap::new());
    let temp = tempfile::TempDir::new()?;

    chapterdl(temp.path())
        .arg(format!("{base_url}/manga/none"))
        .args(["out", "--site", "mangatown", "--cstart", "0"])
        .assert()
        .code(2)
        .stdout("ERR404\n");
    assert!(!temp.path().join("out").exists());

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn throttled_listing_is_a_scrape_error_not_a_missing_work() -> anyhow::Result<()> {
    let mut routes = HashMap::new();
    routes.insert("/manga/w".to_string(), Body::Status(503, "slow down"));
    let (base_url, shutdown_tx, server_handle) = spawn_site(routes);
    let temp = tempfile::TempDir::new()?;

    chapterdl(temp.path())
        .arg(format!("{base_url}/manga/w"))
        .args(["out", "--site", "mangatown", "--cstart", "0"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ERR404").not())
        .stderr(predicate::str::contains("HTTP 503"));
    assert!(!temp.path().join("out").exists());

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn out_of_range_selection_exits_1_without_writing() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_site(mangatown_routes());
    let temp = tempfile::TempDir::new()?;

    chapterdl(temp.path())
        .arg(format!("{base_url}/manga/w"))
        .args(["out", "--site", "mangatown"])
        .args(["--cstart", "1", "--cstop", "3"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("out of range"));
    assert!(!temp.path().join("out").exists());

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}
