//! Document assembly: swap placeholders for image references and write the
//! LaTeX headers/template pandoc is pointed at.

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::fonts::FontSet;
use crate::output::AssetResult;
use crate::pipeline::extract::{parse_placeholder, Artifact, ArtifactKind};
use std::path::{Path, PathBuf};

pub const DOCUMENT_FILE: &str = "document.md";
pub const HEADER_FILE: &str = "header.tex";
pub const SIMPLE_HEADER_FILE: &str = "header-simple.tex";
pub const TEMPLATE_FILE: &str = "template.tex";

/// Replace every placeholder line with the artifact's final Markdown.
///
/// * rendered → `![title](file)` followed by an italic caption
/// * unsupported type → `*title (unsupported type: mime)*`
/// * render failure → `*title (diagram could not be rendered)*`
/// * unknown id → the trimmed placeholder line is kept
pub fn replace_placeholders(markdown: &str, artifacts: &[Artifact], assets: &[AssetResult]) -> String {
    markdown
        .split('\n')
        .map(|line| {
            let Some(id) = parse_placeholder(line) else {
                return line.to_string();
            };
            let Some(artifact) = artifacts.iter().find(|a| a.id == id) else {
                return line.trim().to_string();
            };
            let title = escape_brackets(&artifact.title);
            let asset = assets.iter().find(|a| a.id == id);

            match (asset.and_then(|a| a.file.as_deref()), &artifact.kind) {
                (_, ArtifactKind::Unsupported) => {
                    format!("*{title} (unsupported type: {})*", artifact.mime)
                }
                (Some(file), _) => format!("![{title}]({})\n\n*{title}*", link_target(file)),
                (None, _) => format!("*{title} (diagram could not be rendered)*"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_brackets(s: &str) -> String {
    s.replace('[', "\\[").replace(']', "\\]")
}

fn link_target(file: &str) -> String {
    if file.contains(char::is_whitespace) {
        format!("<{file}>")
    } else {
        file.to_string()
    }
}

/// Header for the first compile attempt: math symbols and operators,
/// spacing tweaks, and a Python listings language set in `mono_font`.
pub fn full_header(mono_font: &str) -> String {
    FULL_HEADER.replace("@MONO_FONT@", mono_font)
}

/// Reduced header for the second compile attempt.
pub fn simple_header() -> &'static str {
    SIMPLE_HEADER
}

/// A complete LaTeX template for `pandoc --template`.
pub fn standalone_template(fonts: &FontSet, config: &ConversionConfig) -> String {
    let toc = if config.toc {
        "\\tableofcontents\n\\newpage\n"
    } else {
        ""
    };
    STANDALONE_TEMPLATE
        .replace("@SERIF_FONT@", &fonts.serif)
        .replace("@SANS_FONT@", &fonts.sans)
        .replace("@MONO_FONT@", &fonts.mono)
        .replace("@MARGIN@", &config.margin)
        .replace("@TOC_DEPTH@", &config.toc_depth.to_string())
        .replace("@TOC@", toc)
}

/// Paths of the files written into the work directory for pandoc.
#[derive(Debug, Clone)]
pub struct Intermediates {
    pub markdown: PathBuf,
    pub header: PathBuf,
    pub simple_header: PathBuf,
    pub template: Option<PathBuf>,
}

/// Write the Markdown, both headers and (when enabled) the template.
pub async fn write_intermediates(
    work_dir: &Path,
    markdown: &str,
    fonts: &FontSet,
    config: &ConversionConfig,
) -> Result<Intermediates, Md2PdfError> {
    let write = |name: &str, content: String| {
        let path = work_dir.join(name);
        async move {
            tokio::fs::write(&path, content)
                .await
                .map_err(Md2PdfError::work_dir(&path))?;
            Ok::<_, Md2PdfError>(path)
        }
    };

    let template = if config.standalone_template {
        Some(write(TEMPLATE_FILE, standalone_template(fonts, config)).await?)
    } else {
        None
    };

    Ok(Intermediates {
        markdown: write(DOCUMENT_FILE, markdown.to_string()).await?,
        header: write(HEADER_FILE, full_header(&fonts.mono)).await?,
        simple_header: write(SIMPLE_HEADER_FILE, simple_header().to_string()).await?,
        template,
    })
}

const FULL_HEADER: &str = r#"
% Math support
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage{amsfonts}
\usepackage{listings}
\usepackage{xcolor}

% Math alphabets and symbol fonts
\DeclareMathAlphabet{\mathbf}{OT1}{cmr}{bx}{n}
\DeclareSymbolFont{letters}{OML}{cmm}{m}{it}
\DeclareSymbolFont{operators}{OT1}{cmr}{m}{n}
\DeclareSymbolFont{symbols}{OMS}{cmsy}{m}{n}

% Greek letters bound to the letters font
\let\Omega\relax
\DeclareMathSymbol{\Omega}{\mathalpha}{letters}{"0A}
\let\omega\relax
\DeclareMathSymbol{\omega}{\mathalpha}{letters}{"21}
\let\theta\relax
\DeclareMathSymbol{\theta}{\mathalpha}{letters}{"12}

% Spacing in formulas
\thickmuskip=5mu plus 3mu minus 1mu
\medmuskip=4mu plus 2mu minus 1mu
\thinmuskip=3mu

% Operators
\DeclareMathOperator{\diff}{d}
\DeclareMathOperator{\Tr}{Tr}
\DeclareMathOperator{\Det}{Det}

% Listing colours
\definecolor{codebackground}{RGB}{250,250,250}
\definecolor{codekeyword}{RGB}{0,0,255}
\definecolor{codecomment}{RGB}{0,128,0}
\definecolor{codestring}{RGB}{163,21,21}
\definecolor{codenumber}{RGB}{100,50,200}
\definecolor{codebuiltin}{RGB}{0,112,163}

\lstdefinelanguage{pythoncode}{
  language=Python,
  basicstyle=\ttfamily\small,
  breaklines=true,
  showstringspaces=false,
  keywordstyle=\color{codekeyword},
  stringstyle=\color{codestring},
  commentstyle={\color{codecomment}\fontspec{@MONO_FONT@}},
  numberstyle=\tiny\color{codenumber},
  identifierstyle=\ttfamily,
  backgroundcolor=\color{codebackground},
  frame=single,
  rulecolor=\color{black},
  tabsize=4,
  extendedchars=true,
  inputencoding=utf8,
  keywords={and,as,assert,break,class,continue,def,del,elif,else,except,
            finally,for,from,global,if,import,in,is,lambda,not,or,pass,
            print,raise,return,try,while,with,yield,None,True,False},
  keywordstyle=[2]{\color{codebuiltin}},
  keywords=[2]{abs,all,any,bin,bool,bytearray,bytes,callable,chr,classmethod,
             compile,complex,delattr,dict,dir,divmod,enumerate,eval,exec,
             filter,float,format,frozenset,getattr,globals,hasattr,hash,
             help,hex,id,input,int,isinstance,issubclass,iter,len,list,
             locals,map,max,memoryview,min,next,object,oct,open,ord,pow,
             property,range,repr,reversed,round,set,setattr,slice,sorted,
             staticmethod,str,sum,super,tuple,type,vars,zip},
  literate={，}{{，}}1 {。}{{。}}1 {：}{{：}}1 {；}{{；}}1 {！}{{！}}1 {？}{{？}}1
           {'}{{\textquotesingle}}1
}

\lstset{language=pythoncode}
"#;

const SIMPLE_HEADER: &str = r#"
% Math support
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage{amsfonts}
\usepackage{listings}
\usepackage{xcolor}

% Spacing in formulas
\thickmuskip=5mu plus 3mu minus 1mu
\medmuskip=4mu plus 2mu minus 1mu
\thinmuskip=3mu

\providecommand{\bm}[1]{\boldsymbol{#1}}

\definecolor{codebackground}{RGB}{250,250,250}
\definecolor{codekeyword}{RGB}{0,0,255}
\definecolor{codecomment}{RGB}{0,128,0}
\definecolor{codestring}{RGB}{163,21,21}

\lstdefinelanguage{pythoncode}{
  language=Python,
  basicstyle=\ttfamily\small,
  breaklines=true,
  keywordstyle=\color{codekeyword},
  stringstyle=\color{codestring},
  commentstyle=\color{codecomment},
  backgroundcolor=\color{codebackground},
  frame=single
}

\lstset{language=pythoncode}
"#;

const STANDALONE_TEMPLATE: &str = r#"\documentclass[12pt, a4paper]{article}
\usepackage{fontspec}
\usepackage{xeCJK}
\usepackage{geometry}
\usepackage{graphicx}
\usepackage{hyperref}
\usepackage{fancyhdr}
\usepackage{titlesec}
\usepackage{caption}
\usepackage{listings}
\usepackage{xcolor}
\usepackage{booktabs}
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage{longtable}
\usepackage{array}
\usepackage{multirow}
\usepackage{float}
\usepackage{ulem}
\usepackage{bm}

\providecommand{\pandocbounded}[1]{#1}
\providecommand{\tightlist}{\setlength{\itemsep}{0pt}\setlength{\parskip}{0pt}}
\makeatletter
\def\maxwidth{\ifdim\Gin@nat@width>\linewidth\linewidth\else\Gin@nat@width\fi}
\makeatother
\setkeys{Gin}{width=\maxwidth,keepaspectratio}

\setCJKmainfont{@SERIF_FONT@}
\setCJKsansfont{@SANS_FONT@}
\setCJKmonofont{@MONO_FONT@}

\geometry{a4paper, margin=@MARGIN@}
\setcounter{tocdepth}{@TOC_DEPTH@}

\titleformat{\section}{\Large\bfseries}{\thesection}{1em}{}
\titleformat{\subsection}{\large\bfseries}{\thesubsection}{1em}{}
\titleformat{\subsubsection}{\normalsize\bfseries}{\thesubsubsection}{1em}{}

\definecolor{codeback}{rgb}{0.95,0.95,0.95}
\definecolor{codeframe}{rgb}{0.8,0.8,0.8}
\lstset{
    backgroundcolor=\color{codeback},
    frame=single,
    rulecolor=\color{codeframe},
    basicstyle=\ttfamily\small,
    breaklines=true,
    captionpos=b
}

\pagestyle{fancy}
\fancyhf{}
\fancyfoot[C]{\thepage}
\renewcommand{\headrulewidth}{0pt}
\captionsetup{font=small}
\allowdisplaybreaks

\hypersetup{
    colorlinks=true,
    linkcolor=blue,
    filecolor=magenta,
    urlcolor=cyan,
}

$for(header-includes)$
$header-includes$
$endfor$

$if(title)$
\title{$title$}
$endif$
$if(author)$
\author{$for(author)$$author$$sep$ \and $endfor$}
$endif$
\date{$date$}

\begin{document}
$if(title)$
\maketitle
$endif$

@TOC@
$body$

\end{document}
"#;
