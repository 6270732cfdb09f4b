//! Lattes CV XML export.
//!
//! The export is a flat attribute-heavy dialect: each production element
//! (`ARTIGO-PUBLICADO`, `TRABALHO-EM-EVENTOS`, ...) holds a `DADOS-BASICOS-*`
//! element with title/year/DOI, a `DETALHAMENTO-*` element with venue data,
//! and one `AUTORES` element per byline entry. Exports are usually
//! ISO-8859-1, so the bytes are decoded as UTF-8 with a Latin-1 fallback.

use crate::error::{CvError, Result};
use crate::record::{non_empty, normalize_doi, AuthorRef, Biblio, Source, WorkRecord, WorkType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Production kinds read from the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LattesKind {
    JournalArticle,
    ConferencePaper,
    BookChapter,
    Book,
}

impl LattesKind {
    fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"ARTIGO-PUBLICADO" => Some(Self::JournalArticle),
            b"TRABALHO-EM-EVENTOS" => Some(Self::ConferencePaper),
            b"CAPITULO-DE-LIVRO-PUBLICADO" => Some(Self::BookChapter),
            b"LIVRO-PUBLICADO-OU-ORGANIZADO" => Some(Self::Book),
            _ => None,
        }
    }

    fn work_type(&self) -> WorkType {
        match self {
            Self::JournalArticle => WorkType::Article,
            Self::ConferencePaper => WorkType::ProceedingsArticle,
            Self::BookChapter => WorkType::BookChapter,
            Self::Book => WorkType::Book,
        }
    }

    fn title_attr(&self) -> &'static [u8] {
        match self {
            Self::JournalArticle => b"TITULO-DO-ARTIGO",
            Self::ConferencePaper => b"TITULO-DO-TRABALHO",
            Self::BookChapter => b"TITULO-DO-CAPITULO-DO-LIVRO",
            Self::Book => b"TITULO-DO-LIVRO",
        }
    }

    fn year_attrs(&self) -> &'static [&'static [u8]] {
        match self {
            Self::JournalArticle => &[b"ANO-DO-ARTIGO"],
            Self::ConferencePaper => &[b"ANO-DO-TRABALHO"],
            Self::BookChapter => &[b"ANO", b"ANO-DO-CAPITULO"],
            Self::Book => &[b"ANO"],
        }
    }

    fn venue_attr(&self) -> &'static [u8] {
        match self {
            Self::JournalArticle => b"TITULO-DO-PERIODICO-OU-REVISTA",
            Self::ConferencePaper => b"TITULO-DOS-ANAIS-OU-PROCEEDINGS",
            Self::BookChapter => b"TITULO-DO-LIVRO",
            Self::Book => b"NOME-DA-EDITORA",
        }
    }
}

/// One production as the export describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LattesWork {
    pub kind: LattesKind,
    pub title: String,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub home_page: Option<String>,
    pub venue: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    pub last_page: Option<String>,
    pub authors: Vec<String>,
}

impl LattesWork {
    fn empty(kind: LattesKind) -> Self {
        Self {
            kind,
            title: String::new(),
            year: None,
            doi: None,
            home_page: None,
            venue: None,
            volume: None,
            issue: None,
            first_page: None,
            last_page: None,
            authors: Vec::new(),
        }
    }

    pub fn into_record(self) -> WorkRecord {
        let mut record = WorkRecord::new(self.title, Source::Lattes);
        record.year = self.year;
        record.work_type = self.kind.work_type();
        record.venue = self.venue;
        record.doi = self.doi.as_deref().and_then(normalize_doi);
        record.url = self.home_page;
        record.authors = self.authors.into_iter().map(AuthorRef::named).collect();
        record.biblio = Biblio {
            volume: self.volume,
            issue: self.issue,
            first_page: self.first_page,
            last_page: self.last_page,
        };
        record
    }
}

/// Read and parse a Lattes export from disk.
pub fn read_lattes(path: &Path) -> Result<Vec<LattesWork>> {
    let bytes = std::fs::read(path)?;
    let works = parse_lattes(&decode(bytes))?;
    info!(path = %path.display(), works = works.len(), "Parsed Lattes export");
    Ok(works)
}

/// UTF-8 when valid, otherwise ISO-8859-1 (every byte is one code point).
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

pub fn parse_lattes(xml: &str) -> Result<Vec<LattesWork>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut works = Vec::new();
    let mut current: Option<LattesWork> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if let Some(kind) = LattesKind::from_element(e.name().as_ref()) {
                    current = Some(LattesWork::empty(kind));
                } else if let Some(work) = current.as_mut() {
                    apply_element(work, &e)?;
                }
            }
            Event::Empty(e) => {
                if let Some(work) = current.as_mut() {
                    apply_element(work, &e)?;
                }
            }
            Event::End(e) => {
                if LattesKind::from_element(e.name().as_ref()).is_some() {
                    if let Some(work) = current.take() {
                        if work.title.is_empty() {
                            debug!(kind = ?work.kind, "Skipping Lattes production without title");
                        } else {
                            works.push(work);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(works)
}

fn apply_element(work: &mut LattesWork, element: &BytesStart) -> Result<()> {
    let name = element.name();
    let name = name.as_ref();

    if name.starts_with(b"DADOS-BASICOS-DO") {
        for (key, value) in attributes(element)? {
            if key == work.kind.title_attr() {
                work.title = value;
            } else if work.kind.year_attrs().contains(&key.as_slice()) {
                if work.year.is_none() {
                    work.year = value.parse().ok();
                }
            } else if key == b"DOI" {
                work.doi = non_empty(value);
            } else if key == b"HOME-PAGE-DO-TRABALHO" {
                work.home_page = clean_home_page(&value);
            }
        }
    } else if name.starts_with(b"DETALHAMENTO-DO") {
        for (key, value) in attributes(element)? {
            if key == work.kind.venue_attr() {
                work.venue = non_empty(value);
            } else {
                match key.as_slice() {
                    b"VOLUME" => work.volume = non_empty(value),
                    b"FASCICULO" => work.issue = non_empty(value),
                    b"PAGINA-INICIAL" => work.first_page = non_empty(value),
                    b"PAGINA-FINAL" => work.last_page = non_empty(value),
                    _ => {}
                }
            }
        }
    } else if name == b"AUTORES" {
        let author = attributes(element)?
            .into_iter()
            .find(|(key, _)| key == b"NOME-COMPLETO-DO-AUTOR")
            .and_then(|(_, value)| non_empty(value));
        if let Some(author) = author {
            work.authors.push(author);
        }
    }
    Ok(())
}

/// Attribute pairs with unescaped, trimmed values.
fn attributes(element: &BytesStart) -> Result<Vec<(Vec<u8>, String)>> {
    let mut pairs = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| CvError::Parse(format!("Lattes attribute: {}", e)))?;
        let raw = String::from_utf8_lossy(&attr.value);
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| CvError::Parse(format!("Lattes attribute value: {}", e)))?;
        pairs.push((attr.key.as_ref().to_vec(), value.trim().to_string()));
    }
    Ok(pairs)
}

/// Lattes wraps home pages in brackets (`[http://...]`).
fn clean_home_page(raw: &str) -> Option<String> {
    non_empty(raw.trim().trim_start_matches('[').trim_end_matches(']'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<CURRICULO-VITAE>
  <PRODUCAO-BIBLIOGRAFICA>
    <ARTIGOS-PUBLICADOS>
      <ARTIGO-PUBLICADO SEQUENCIA-PRODUCAO="1">
        <DADOS-BASICOS-DO-ARTIGO NATUREZA="COMPLETO" TITULO-DO-ARTIGO="Open Source &amp; Governance" ANO-DO-ARTIGO="2019" DOI="10.1/ABC" HOME-PAGE-DO-TRABALHO="[http://example.org/a]"/>
        <DETALHAMENTO-DO-ARTIGO TITULO-DO-PERIODICO-OU-REVISTA="Revista de Gestão" VOLUME="12" FASCICULO="3" PAGINA-INICIAL="1" PAGINA-FINAL="20"/>
        <AUTORES NOME-COMPLETO-DO-AUTOR="Carlos Denner dos Santos" ORDEM-DE-AUTORIA="1"/>
        <AUTORES NOME-COMPLETO-DO-AUTOR="Maria Silva" ORDEM-DE-AUTORIA="2"/>
      </ARTIGO-PUBLICADO>
    </ARTIGOS-PUBLICADOS>
    <TRABALHOS-EM-EVENTOS>
      <TRABALHO-EM-EVENTOS SEQUENCIA-PRODUCAO="2">
        <DADOS-BASICOS-DO-TRABALHO TITULO-DO-TRABALHO="Attractiveness of Projects" ANO-DO-TRABALHO="2011" DOI=""/>
        <DETALHAMENTO-DO-TRABALHO TITULO-DOS-ANAIS-OU-PROCEEDINGS="Proceedings of AMCIS"/>
      </TRABALHO-EM-EVENTOS>
    </TRABALHOS-EM-EVENTOS>
    <LIVROS-E-CAPITULOS>
      <CAPITULOS-DE-LIVROS-PUBLICADOS>
        <CAPITULO-DE-LIVRO-PUBLICADO>
          <DADOS-BASICOS-DO-CAPITULO TITULO-DO-CAPITULO-DO-LIVRO="A Chapter" ANO="2015"/>
          <DETALHAMENTO-DO-CAPITULO TITULO-DO-LIVRO="Big Book"/>
        </CAPITULO-DE-LIVRO-PUBLICADO>
      </CAPITULOS-DE-LIVROS-PUBLICADOS>
      <LIVROS-PUBLICADOS-OU-ORGANIZADOS>
        <LIVRO-PUBLICADO-OU-ORGANIZADO>
          <DADOS-BASICOS-DO-LIVRO TITULO-DO-LIVRO="" ANO="2010"/>
          <DETALHAMENTO-DO-LIVRO NOME-DA-EDITORA="Editora"/>
        </LIVRO-PUBLICADO-OU-ORGANIZADO>
      </LIVROS-PUBLICADOS-OU-ORGANIZADOS>
    </LIVROS-E-CAPITULOS>
  </PRODUCAO-BIBLIOGRAFICA>
</CURRICULO-VITAE>"#;

    #[test]
    fn test_parse_lattes() {
        let works = parse_lattes(SAMPLE).unwrap();
        assert_eq!(works.len(), 3, "untitled book is skipped");

        let article = &works[0];
        assert_eq!(article.kind, LattesKind::JournalArticle);
        assert_eq!(article.title, "Open Source & Governance");
        assert_eq!(article.year, Some(2019));
        assert_eq!(article.home_page.as_deref(), Some("http://example.org/a"));
        assert_eq!(article.venue.as_deref(), Some("Revista de Gestão"));
        assert_eq!(article.authors, vec!["Carlos Denner dos Santos", "Maria Silva"]);

        assert_eq!(works[1].kind, LattesKind::ConferencePaper);
        assert_eq!(works[1].doi, None);
        assert_eq!(works[2].year, Some(2015));
        assert_eq!(works[2].venue.as_deref(), Some("Big Book"));
    }

    #[test]
    fn test_into_record() {
        let works = parse_lattes(SAMPLE).unwrap();
        let record = works[0].clone().into_record();
        assert_eq!(record.source, Source::Lattes);
        assert_eq!(record.work_type, WorkType::Article);
        assert_eq!(record.doi.as_deref(), Some("10.1/abc"));
        assert_eq!(record.biblio.volume_issue(), "volume=12, number=3");
        assert_eq!(record.authors[1].display_name, "Maria Silva");

        let paper = works[1].clone().into_record();
        assert_eq!(paper.work_type, WorkType::ProceedingsArticle);
    }

    #[test]
    fn test_decode_latin1() {
        let bytes = vec![b'G', b'e', b's', b't', 0xE3, b'o'];
        assert_eq!(decode(bytes), "Gestão");
        assert_eq!(decode("já".as_bytes().to_vec()), "já");
    }
}
