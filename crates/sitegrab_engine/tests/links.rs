use pretty_assertions::assert_eq;
use sitegrab_engine::{
    extract_css_urls, extract_html_links, extract_js_module_links, rewrite_css_urls, HtmlDocument,
    LinkSlot,
};

#[test]
fn css_accepts_every_quoting_style() {
    let css = r#"
        a { background: url('single.png'); }
        b { background: URL("double.png"); }
        c { background: url(`tick.png`); }
        d { background: url( bare.png ); }
    "#;
    assert_eq!(
        extract_css_urls(css),
        vec!["single.png", "double.png", "tick.png", "bare.png"]
    );
}

#[test]
fn css_skips_comments_strings_and_malformed_tokens() {
    let css = r#"
        /* url(commented.png) */
        a::before { content: "url(in-string.png)"; }
        b { background: url('mismatched.png"); }
        c { background: url(""doubled.png""); }
        d { background: url(); }
        e { background: myurl(not-a-url.png); }
        f { background: url(kept.png); }
    "#;
    assert_eq!(extract_css_urls(css), vec!["kept.png"]);
}

#[test]
fn css_rewrite_touches_only_url_values() {
    let css = "a{background:url('a.png') no-repeat}b{background:url(b.png)}";
    let rewritten = rewrite_css_urls(css, |url| format!("local/{url}"));
    assert_eq!(
        rewritten,
        "a{background:url('local/a.png') no-repeat}b{background:url(local/b.png)}"
    );

    let quoted = rewrite_css_urls("x{background:url(a.png)}", |_| "my file.png".to_string());
    assert_eq!(quoted, "x{background:url(\"my file.png\")}");
}

#[test]
fn html_links_come_out_in_document_order() {
    let html = r#"<!doctype html>
        <html><head>
          <link rel="stylesheet" href="/style.css">
          <style>body { background: url(bg.png); }</style>
          <script src="app.js"></script>
        </head><body>
          <a href="page.html">page</a>
          <img src=" logo.png " style="border-image: url('border.png')">
          <video src="clip.mp4"></video>
          <audio src="sound.ogg"></audio>
          <iframe src="frame.html"></iframe>
          <object data="movie.swf"></object>
          <a name="no-href">anchor</a>
          <img src="">
        </body></html>"#;
    assert_eq!(
        extract_html_links(html),
        vec![
            "/style.css",
            "bg.png",
            "app.js",
            "page.html",
            "logo.png",
            "border.png",
            "clip.mp4",
            "sound.ogg",
            "frame.html",
            "movie.swf",
        ]
    );
}

#[test]
fn link_slots_identify_where_each_link_lives() {
    let document = HtmlDocument::parse(
        r#"<p style="background:url(p.png)"><a href="x.html">x</a></p><style>i{background:url(s.png)}</style>"#,
    );
    let slots: Vec<_> = document
        .links()
        .into_iter()
        .map(|link| match link.slot {
            LinkSlot::Attribute { name, .. } => format!("attr:{name}:{}", link.url),
            LinkSlot::InlineStyle { .. } => format!("inline:{}", link.url),
            LinkSlot::StyleText { .. } => format!("style:{}", link.url),
        })
        .collect();
    assert_eq!(slots, vec!["inline:p.png", "attr:href:x.html", "style:s.png"]);
}

#[test]
fn html_rewrite_updates_attributes_and_styles() {
    let mut document = HtmlDocument::parse(
        r#"<html><head><style>b{background:url(bg.png)}</style></head><body><img src="bg.png" style="x:url(bg.png)"><a href="keep.html">k</a></body></html>"#,
    );
    let changed = document.rewrite_links(|url| (url == "bg.png").then(|| "img/bg.png".to_string()));
    assert_eq!(changed, 3);

    let rendered = document.render();
    assert!(rendered.contains(r#"src="img/bg.png""#), "{rendered}");
    assert!(rendered.contains("url(img/bg.png)"), "{rendered}");
    assert!(rendered.contains(r#"href="keep.html""#), "{rendered}");
    assert_eq!(extract_html_links(&rendered).len(), 4);
}

#[test]
fn js_module_references_cover_import_and_require() {
    let source = r#"
        import React from "react";
        import { a, b as c } from './lib/util.js';
        import * as ns from "../ns.mjs";
        import "./side-effect.js";
        const fs = require('fs');
        const cfg = require ( "./config.json" );
    "#;
    assert_eq!(
        extract_js_module_links(source),
        vec![
            "react",
            "./lib/util.js",
            "../ns.mjs",
            "./side-effect.js",
            "fs",
            "./config.json",
        ]
    );
}
