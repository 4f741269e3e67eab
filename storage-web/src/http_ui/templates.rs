use maud::{html, Markup, PreEscaped, DOCTYPE};

use storage_core::StorageEntry;

use super::blobs::BlobListing;
use super::files::FileListing;

/// Base HTML layout
fn layout(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style { (PreEscaped(STYLES)) }
            }
            body {
                header {
                    h1 { "Storage Browser" }
                    nav {
                        a href="/blobs" { "Blobs" }
                        " | "
                        a href="/files" { "Files" }
                        " | "
                        a href="/health" { "Health" }
                    }
                }
                main {
                    (content)
                }
                footer {
                    p { "storage-web v" (env!("CARGO_PKG_VERSION")) }
                }
            }
        }
    }
}

/// Breadcrumb links for a `/` separated location.
fn breadcrumb(root_label: &str, root_href: &str, param: &str, location: &str) -> Markup {
    let parts: Vec<&str> = location
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    html! {
        div class="breadcrumb" {
            a href=(root_href) { (root_label) }
            @for (i, part) in parts.iter().enumerate() {
                " / "
                @if i == parts.len() - 1 {
                    strong { (part) }
                } @else {
                    @let target = parts[..=i].join("/");
                    a href={ (root_href) "?" (param) "=" (urlencoding::encode(&target)) } { (part) }
                }
            }
        }
    }
}

fn upload_form(action: &str, directory: &str) -> Markup {
    html! {
        form class="upload-form" method="post" action=(action) enctype="multipart/form-data" {
            div class="form-group" {
                label for="directory" { "Directory" }
                input type="text" id="directory" name="directory" value=(directory);
            }
            div class="form-group" {
                label for="file" { "File" }
                input type="file" id="file" name="file" multiple;
            }
            button type="submit" class="btn btn-primary" { "Upload" }
        }
    }
}

fn entry_rows(entries: &[StorageEntry], directory_href: impl Fn(&str) -> String, area: &str) -> Markup {
    html! {
        @for entry in entries.iter().filter(|e| e.is_directory) {
            tr class="directory-row" {
                td {
                    a href=(directory_href(&entry.name)) { "📁 " (entry.display_name()) }
                }
                td class="number" { "—" }
                td { "—" }
                td {}
            }
        }
        @for entry in entries.iter().filter(|e| !e.is_directory) {
            tr {
                td {
                    a href={ "/" (area) "/download?name=" (urlencoding::encode(&entry.name)) } {
                        "📄 " (entry.display_name())
                    }
                }
                td class="number" {
                    @match entry.size {
                        Some(size) => { (format_size(size)) }
                        None => { "—" }
                    }
                }
                td {
                    @match entry.last_modified {
                        Some(time) => { (time.format("%Y-%m-%d %H:%M:%S UTC").to_string()) }
                        None => { "—" }
                    }
                }
                td {
                    form method="post" action={ "/" (area) "/delete" } class="inline-form" {
                        input type="hidden" name="name" value=(entry.name);
                        button type="submit" class="btn btn-danger btn-small" { "Delete" }
                    }
                }
            }
        }
    }
}

fn entry_table(rows: Markup) -> Markup {
    html! {
        table {
            thead {
                tr {
                    th { "Name" }
                    th class="number" { "Size" }
                    th { "Last Modified" }
                    th {}
                }
            }
            tbody { (rows) }
        }
    }
}

/// Blob listing page
pub fn blobs_page(listing: &BlobListing) -> String {
    let directory = listing.prefix.trim_end_matches('/');
    let content = html! {
        (breadcrumb("Blobs", "/blobs", "prefix", &listing.prefix))

        div class="page-header" {
            h2 {
                @if listing.prefix.is_empty() {
                    "Blob container"
                } @else {
                    "\"" (directory) "\""
                }
            }
            span class="count" { (listing.count) " item(s)" }
        }

        div class="toolbar" {
            a class="btn" href={ "/blobs/zip?prefix=" (urlencoding::encode(&listing.prefix)) } { "Download as zip" }
            " "
            @if listing.flat {
                a class="btn" href={ "/blobs?prefix=" (urlencoding::encode(&listing.prefix)) } { "Folder view" }
            } @else {
                a class="btn" href={ "/blobs?flat=true&prefix=" (urlencoding::encode(&listing.prefix)) } { "Flat view" }
            }
        }

        @if listing.entries.is_empty() {
            p class="empty-state" { "No blobs in this location" }
        } @else {
            (entry_table(entry_rows(
                &listing.entries,
                |name| format!("/blobs?prefix={}", urlencoding::encode(&format!("{name}/"))),
                "blobs",
            )))
        }

        h3 { "Upload" }
        (upload_form("/blobs/upload", directory))
    };

    layout("Blobs - Storage Browser", content).into_string()
}

/// Share directory page
pub fn files_page(listing: &FileListing) -> String {
    let content = html! {
        (breadcrumb("Files", "/files", "dir", &listing.directory))

        div class="page-header" {
            h2 {
                @if listing.directory.is_empty() {
                    "File share"
                } @else {
                    "\"" (listing.directory) "\""
                }
            }
            span class="count" { (listing.count) " item(s)" }
        }

        @if listing.entries.is_empty() {
            p class="empty-state" { "This directory is empty" }
        } @else {
            (entry_table(entry_rows(
                &listing.entries,
                |name| format!("/files?dir={}", urlencoding::encode(name)),
                "files",
            )))
        }

        h3 { "Upload" }
        (upload_form("/files/upload", &listing.directory))
    };

    layout("Files - Storage Browser", content).into_string()
}

pub fn error_page(message: &str) -> String {
    let content = html! {
        div class="error-page" {
            h2 { "Error" }
            p { (message) }
            p {
                a href="/blobs" { "← Back to blobs" }
            }
        }
    };

    layout("Error - Storage Browser", content).into_string()
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

const STYLES: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: system-ui, -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    line-height: 1.6;
    color: #333;
    background: #f5f5f5;
    padding-bottom: 3rem;
}

header {
    background: #2c3e50;
    color: white;
    padding: 1rem 2rem;
    display: flex;
    justify-content: space-between;
    align-items: center;
}

header h1 {
    font-size: 1.5rem;
    font-weight: 600;
}

nav a {
    color: #ecf0f1;
    text-decoration: none;
    font-size: 0.9rem;
}

main {
    max-width: 1400px;
    margin: 2rem auto;
    background: white;
    border-radius: 8px;
    box-shadow: 0 1px 3px rgba(0,0,0,0.1);
    padding: 2rem;
}

main h3 {
    margin-top: 2rem;
    color: #2c3e50;
}

footer {
    text-align: center;
    color: #666;
    font-size: 0.85rem;
    margin-top: 2rem;
}

.breadcrumb {
    color: #666;
    margin-bottom: 1.5rem;
    font-size: 0.9rem;
}

.breadcrumb a, tbody a, .error-page a {
    color: #3498db;
    text-decoration: none;
}

.page-header {
    display: flex;
    justify-content: space-between;
    align-items: center;
    margin-bottom: 1.5rem;
    padding-bottom: 1rem;
    border-bottom: 2px solid #ecf0f1;
}

.page-header h2 {
    font-size: 1.75rem;
    color: #2c3e50;
}

.count {
    color: #7f8c8d;
    font-size: 0.9rem;
}

.toolbar {
    margin-bottom: 1rem;
}

table {
    width: 100%;
    border-collapse: collapse;
    margin-top: 1rem;
}

th, td {
    text-align: left;
    padding: 0.4rem 0.6rem;
    border-bottom: 1px solid #ecf0f1;
}

th {
    background: #f8f9fa;
    font-weight: 600;
    color: #555;
    font-size: 0.9rem;
}

th.number, td.number {
    text-align: right;
}

tbody tr:hover {
    background: #f8f9fa;
}

.directory-row {
    font-weight: 500;
}

.inline-form {
    display: inline;
}

.upload-form {
    max-width: 600px;
    margin-top: 1rem;
}

.form-group {
    margin-bottom: 1rem;
}

.form-group label {
    display: block;
    margin-bottom: 0.5rem;
    font-weight: 500;
}

.form-group input[type="text"] {
    width: 100%;
    padding: 0.5rem;
    border: 1px solid #ddd;
    border-radius: 4px;
    font-size: 1rem;
}

.btn {
    display: inline-block;
    padding: 0.5rem 1rem;
    border: 1px solid #ddd;
    border-radius: 4px;
    background: white;
    color: #333;
    text-decoration: none;
    cursor: pointer;
    font-size: 1rem;
}

.btn-primary {
    background: #007bff;
    color: white;
    border-color: #007bff;
}

.btn-danger {
    background: #d9534f;
    color: white;
    border-color: #d9534f;
}

.btn-small {
    padding: 0.25rem 0.5rem;
    font-size: 0.875rem;
}

.empty-state {
    text-align: center;
    color: #95a5a6;
    padding: 3rem 0;
    font-size: 1.1rem;
}

.error-page {
    text-align: center;
    padding: 3rem 0;
}

.error-page h2 {
    color: #e74c3c;
    margin-bottom: 1rem;
}

@media (max-width: 768px) {
    main {
        margin: 1rem;
        padding: 1rem;
    }

    header {
        flex-direction: column;
        text-align: center;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
    }

    #[test]
    fn test_blobs_page_links() {
        let listing = BlobListing {
            prefix: "Images/".to_string(),
            flat: false,
            entries: vec![
                StorageEntry::directory("Images/2020"),
                StorageEntry::file("Images/cat.png").with_size(10),
            ],
            count: 2,
        };
        let page = blobs_page(&listing);
        assert!(page.contains("/blobs?prefix=Images%2F2020%2F"));
        assert!(page.contains("/blobs/download?name=Images%2Fcat.png"));
        assert!(page.contains("/blobs/zip?prefix=Images%2F"));
        assert!(page.contains("value=\"Images\""));
    }

    #[test]
    fn test_error_page_escapes_message() {
        let page = error_page("<script>");
        assert!(page.contains("&lt;script&gt;"));
    }
}
