//! Haar 캐스케이드 모델과 OpenCV XML 로더.
//!
//! 두 가지 OpenCV 저장 형식을 읽는다.
//! - 신형: `<cascade>` + `<stages>/<weakClassifiers>` + 공유 `<features>` 목록
//! - 구형: `<size>` + `<stages>/<trees>` (노드마다 `<feature>` 내장)
//!
//! 지원 범위는 단일 분기(stump) 약분류기와 기울지 않은 특징이다.

use faceswap_core::error::CoreError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::str::FromStr;

/// 특징 사각형 (검출 윈도우 기준 좌표)
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f64,
}

/// 약분류기 (단일 분기)
#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    pub features: Vec<FeatureRect>,
    /// 분기 임계값 (표준편차 정규화 전)
    pub threshold: f64,
    /// 특징값 < 임계값일 때 점수
    pub left: f64,
    /// 특징값 >= 임계값일 때 점수
    pub right: f64,
}

/// 캐스케이드 단계
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// 단계 통과 최소 점수
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

/// 캐스케이드 모델
#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
}

impl HaarCascade {
    /// OpenCV 캐스케이드 XML 파싱
    pub fn from_opencv_xml(xml: &str) -> Result<Self, CoreError> {
        let document = parse_tree(xml)?;
        let root = document
            .children
            .iter()
            .find(|n| n.name == "opencv_storage")
            .ok_or_else(|| load_err("opencv_storage 요소 없음"))?;
        let cascade = root
            .children
            .first()
            .ok_or_else(|| load_err("캐스케이드 요소 없음"))?;

        let parsed = if cascade.child("stageType").is_some() {
            parse_current_format(cascade)?
        } else if cascade.child("size").is_some() {
            parse_legacy_format(cascade)?
        } else {
            return Err(load_err(format!(
                "알 수 없는 캐스케이드 형식: <{}>",
                cascade.name
            )));
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// 모델 구조 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(load_err("캐스케이드 윈도우 크기 0"));
        }
        if self.stages.is_empty() {
            return Err(load_err("캐스케이드 단계 없음"));
        }
        for (si, stage) in self.stages.iter().enumerate() {
            for classifier in &stage.classifiers {
                if classifier.features.is_empty() {
                    return Err(load_err(format!("단계 {si}: 특징 사각형 없음")));
                }
                for f in &classifier.features {
                    if f.width == 0
                        || f.height == 0
                        || f.x + f.width > self.window_width
                        || f.y + f.height > self.window_height
                    {
                        return Err(load_err(format!(
                            "단계 {si}: 특징 사각형이 윈도우를 벗어남 ({}, {}, {}x{})",
                            f.x, f.y, f.width, f.height
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn load_err(message: impl Into<String>) -> CoreError {
    CoreError::Load(format!("분류기 형식 오류: {}", message.into()))
}

// ============================================================
// 신형 (`opencv-cascade-classifier`)
// ============================================================

fn parse_current_format(cascade: &XmlNode) -> Result<HaarCascade, CoreError> {
    let stage_type = cascade.require("stageType")?.text.trim();
    let feature_type = cascade.require("featureType")?.text.trim();
    if stage_type != "BOOST" || feature_type != "HAAR" {
        return Err(load_err(format!(
            "지원하지 않는 캐스케이드: {stage_type}/{feature_type}"
        )));
    }

    let window_width = cascade.require("width")?.number()?;
    let window_height = cascade.require("height")?.number()?;

    let features = cascade
        .require("features")?
        .items()
        .map(parse_feature)
        .collect::<Result<Vec<_>, _>>()?;

    let mut stages = Vec::new();
    for stage in cascade.require("stages")?.items() {
        let threshold = stage.require("stageThreshold")?.number()?;
        let mut classifiers = Vec::new();
        for weak in stage.require("weakClassifiers")?.items() {
            let nodes: Vec<f64> = weak.require("internalNodes")?.numbers()?;
            let leaves: Vec<f64> = weak.require("leafValues")?.numbers()?;
            // stump: "0 -1 <feature> <threshold>" + 리프 2개
            if nodes.len() != 4 || leaves.len() != 2 || nodes[0] != 0.0 || nodes[1] != -1.0 {
                return Err(load_err("트리형 약분류기는 지원하지 않음"));
            }
            let index = nodes[2] as usize;
            let features = features
                .get(index)
                .cloned()
                .ok_or_else(|| load_err(format!("특징 인덱스 범위 초과: {index}")))?;
            classifiers.push(WeakClassifier {
                features,
                threshold: nodes[3],
                left: leaves[0],
                right: leaves[1],
            });
        }
        stages.push(Stage {
            threshold,
            classifiers,
        });
    }

    Ok(HaarCascade {
        window_width,
        window_height,
        stages,
    })
}

// ============================================================
// 구형 (`opencv-haar-classifier`)
// ============================================================

fn parse_legacy_format(cascade: &XmlNode) -> Result<HaarCascade, CoreError> {
    let size: Vec<u32> = cascade.require("size")?.numbers()?;
    let &[window_width, window_height] = size.as_slice() else {
        return Err(load_err("size는 \"너비 높이\" 형식이어야 함"));
    };

    let mut stages = Vec::new();
    for stage in cascade.require("stages")?.items() {
        let threshold = stage.require("stage_threshold")?.number()?;
        let mut classifiers = Vec::new();
        for tree in stage.require("trees")?.items() {
            let mut nodes = tree.items();
            let (Some(node), None) = (nodes.next(), nodes.next()) else {
                return Err(load_err("트리형 약분류기는 지원하지 않음"));
            };
            if node.child("left_node").is_some() || node.child("right_node").is_some() {
                return Err(load_err("트리형 약분류기는 지원하지 않음"));
            }
            classifiers.push(WeakClassifier {
                features: parse_feature(node.require("feature")?)?,
                threshold: node.require("threshold")?.number()?,
                left: node.require("left_val")?.number()?,
                right: node.require("right_val")?.number()?,
            });
        }
        stages.push(Stage {
            threshold,
            classifiers,
        });
    }

    Ok(HaarCascade {
        window_width,
        window_height,
        stages,
    })
}

/// `<rects>` + 선택적 `<tilted>` 요소를 가진 특징
fn parse_feature(feature: &XmlNode) -> Result<Vec<FeatureRect>, CoreError> {
    if let Some(tilted) = feature.child("tilted") {
        if tilted.number::<u32>()? != 0 {
            return Err(load_err("기울어진 특징은 지원하지 않음"));
        }
    }

    feature
        .require("rects")?
        .items()
        .map(|rect| {
            let values: Vec<f64> = rect.numbers()?;
            let &[x, y, width, height, weight] = values.as_slice() else {
                return Err(load_err(format!("사각형 값 개수 오류: {}", rect.text.trim())));
            };
            if [x, y, width, height].iter().any(|v| *v < 0.0) {
                return Err(load_err(format!("음수 사각형 좌표: {}", rect.text.trim())));
            }
            Ok(FeatureRect {
                x: x as u32,
                y: y as u32,
                width: width as u32,
                height: height as u32,
                weight,
            })
        })
        .collect()
}

// ============================================================
// 최소 XML 트리
// ============================================================

#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&XmlNode, CoreError> {
        self.child(name)
            .ok_or_else(|| load_err(format!("<{}> 안에 <{name}> 없음", self.name)))
    }

    /// 목록 원소 (`<_>`)
    fn items(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter(|c| c.name == "_")
    }

    fn numbers<T: FromStr>(&self) -> Result<Vec<T>, CoreError> {
        self.text
            .split_whitespace()
            .map(|token| {
                token
                    .parse()
                    .map_err(|_| load_err(format!("<{}> 숫자 파싱 실패: {token}", self.name)))
            })
            .collect()
    }

    fn number<T: FromStr>(&self) -> Result<T, CoreError> {
        let mut values = self.numbers()?;
        if values.len() != 1 {
            return Err(load_err(format!("<{}> 값이 하나가 아님", self.name)));
        }
        values
            .pop()
            .ok_or_else(|| load_err(format!("<{}> 값 없음", self.name)))
    }
}

/// 문서 전체를 트리로 읽음 (주석/선언/속성은 무시)
fn parse_tree(xml: &str) -> Result<XmlNode, CoreError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![XmlNode::named(b"#document")];
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(XmlNode::named(e.name().as_ref())),
            Ok(Event::Empty(e)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::named(e.name().as_ref()));
                }
            }
            Ok(Event::Text(t)) => {
                let text = std::str::from_utf8(&t)
                    .map_err(|e| load_err(format!("UTF-8 아님: {e}")))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| load_err("닫는 태그 불일치"))?;
                let parent = stack.last_mut().ok_or_else(|| load_err("닫는 태그 불일치"))?;
                parent.children.push(node);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(load_err(format!("XML 파싱 실패: {e}"))),
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(document), true) => Ok(document),
        _ => Err(load_err("닫히지 않은 요소")),
    }
}
