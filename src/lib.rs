//! # img-rewrite
//!
//! Publishes the local images a generated site refers to and rewrites the
//! references to point at the published files.
//!
//! A page author writes references the short way, with any transform
//! appended as parameters:
//!
//! ```text
//! <img src="sample-photo?w=200,crop=250,0,500,667">
//! <div style="background: url(textures/paper?grayscale&blur=3)">
//! <link rel="icon" href="favicon">
//! ```
//!
//! and the rewriter turns them into content-addressed output paths:
//!
//! ```text
//! <img src="images/sample-photo.1k3m9x.200w.jpg">
//! <div style="background: url(images/paper.0zq81c.g.3b.png)">
//! <link rel="icon" href="icons/favicon.2l9v0a.512w.512h.png">
//! ```
//!
//! # Architecture
//!
//! ```text
//! scan       markup tree  →  candidate values      (which strings may hold references)
//! reference  value        →  parsed references     (base name, params, byte range)
//! resolve    base name    →  source file           (breadth-first search)
//! cache      bytes+params →  output name           (content-addressed key)
//! imaging    source       →  published artifact    (crop/resize/grayscale/blur, icon fan-out)
//! rewrite    all of the above, splicing new paths back into each value
//! ```
//!
//! The output directory is the cache: a file that already exists under its
//! derived name is never regenerated, so re-running over an unchanged source
//! tree writes nothing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`reference`] | Parser for `url(...)` tokens, bare references and their parameters |
//! | [`resolve`] | Base name → source file lookup over [`storage`] |
//! | [`cache`] | Output naming from content checksum and parameters; run statistics |
//! | [`imaging`] | Codec trait, `image`-crate codec, transform and icon operations |
//! | [`scan`] | Element kind table and style allow-list; candidate enumeration |
//! | [`rewrite`] | Orchestration, failure policy, check mode, progress events |
//! | [`markup`] | Markup tree and JSON page manifests |
//! | [`storage`] | Storage trait and filesystem implementation |
//! | [`config`] | `img-rewrite.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting |
//!
//! # Collaborators
//!
//! Pixel work and file access sit behind the [`imaging::ImageCodec`] and
//! [`storage::Storage`] traits. Both are passed into [`rewrite::Rewriter`]
//! by the caller; nothing in the crate holds a global codec or touches the
//! filesystem except through a `Storage`.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod markup;
pub mod output;
pub mod reference;
pub mod resolve;
pub mod rewrite;
pub mod scan;
pub mod storage;
