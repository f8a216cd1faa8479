// 该文件是 Wuzhi （物知） 项目的一部分。
// src/output/draw.rs - 检测结果叠加绘制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  model::{LabelTable, SsdOutput},
  scene::{BoundingBox, DetectedObject},
};

/// 置信度阈值，分数严格大于该值才绘制
pub const SCORE_THRESHOLD: f32 = 0.5;

const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色边框
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色文字
// 文字大小与线宽均按图像高度缩放
const TEXT_SIZE_DIVISOR: f32 = 15.0;
const STROKE_WIDTH_DIVISOR: f32 = 85.0;

const SYSTEM_FONT_PATHS: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("检测 {index} 的类别 {class} 不在标签表中 (共 {labels} 个标签)")]
  UnknownClass { index: usize, class: f32, labels: usize },
  #[error("字体文件读取错误: {0}")]
  FontIoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 把模型输出的归一化 (top, left, bottom, right) 映射为像素坐标矩形
pub fn map_bbox(location: [f32; 4], width: f32, height: f32) -> BoundingBox {
  BoundingBox::new(
    location[1] * width,
    location[0] * height,
    location[3] * width,
    location[2] * height,
  )
}

/// 叠加绘制的结果：绘制后的图像副本与检测到的物体
#[derive(Debug, Clone)]
pub struct Annotated {
  pub image: RgbImage,
  pub objects: Vec<DetectedObject>,
}

pub struct Overlay {
  font: Option<FontArc>,
  threshold: f32,
  box_color: [u8; 3],
  label_color: [u8; 3],
}

impl Default for Overlay {
  fn default() -> Self {
    Self {
      font: None,
      threshold: SCORE_THRESHOLD,
      box_color: BOX_COLOR,
      label_color: LABEL_COLOR,
    }
  }
}

impl Overlay {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, OverlayError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    let font = FontArc::try_from_vec(std::fs::read(path)?)?;
    Ok(self.with_font(font))
  }

  /// 在常见的系统字体位置中查找可用字体，找不到时只绘制边框
  pub fn with_system_font(self) -> Self {
    for path in SYSTEM_FONT_PATHS {
      if !Path::new(path).exists() {
        continue;
      }
      match FontArc::try_from_vec(std::fs::read(path).unwrap_or_default()) {
        Ok(font) => {
          debug!("使用系统字体: {}", path);
          return self.with_font(font);
        }
        Err(e) => debug!("字体 {} 无法使用: {}", path, e),
      }
    }
    warn!("未找到可用字体，标签文字将不会绘制");
    self
  }

  pub fn with_font_or_system(self, font: Option<&Path>) -> Result<Self, OverlayError> {
    match font {
      Some(path) => self.with_font_file(path),
      None => Ok(self.with_system_font()),
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 按阈值筛选检测，并换算到 width x height 的像素坐标
  pub fn detect_objects(
    &self,
    output: &SsdOutput,
    labels: &LabelTable,
    width: u32,
    height: u32,
  ) -> Result<Vec<DetectedObject>, OverlayError> {
    let (w, h) = (width as f32, height as f32);
    let mut objects = Vec::new();

    for (index, &score) in output.scores().iter().enumerate() {
      // NaN 分数不算超过阈值
      if !(score > self.threshold) {
        continue;
      }

      let label = output
        .class_id(index)
        .and_then(|class_id| labels.get(class_id))
        .ok_or(OverlayError::UnknownClass {
          index,
          class: output.class(index),
          labels: labels.len(),
        })?;

      objects.push(DetectedObject {
        bounding_box: map_bbox(output.location(index), w, h),
        label: label.to_string(),
      });
    }

    debug!("阈值 {} 以上的物体: {}", self.threshold, objects.len());
    Ok(objects)
  }

  /// 在源图像的副本上绘制边框与标签，源图像保持不变
  pub fn render(
    &self,
    image: &RgbImage,
    output: &SsdOutput,
    labels: &LabelTable,
  ) -> Result<Annotated, OverlayError> {
    let objects = self.detect_objects(output, labels, image.width(), image.height())?;

    let mut canvas = image.clone();
    let h = canvas.height() as f32;
    let text_size = h / TEXT_SIZE_DIVISOR;
    let stroke_width = h / STROKE_WIDTH_DIVISOR;

    for object in objects.iter() {
      self.draw_stroked_rect(&mut canvas, &object.bounding_box, stroke_width);
      self.draw_label(
        &mut canvas,
        &object.label,
        object.bounding_box.left,
        object.bounding_box.top,
        text_size,
      );
    }

    Ok(Annotated {
      image: canvas,
      objects,
    })
  }

  // 线宽以矩形边为中心向两侧展开
  fn draw_stroked_rect(&self, image: &mut RgbImage, bbox: &BoundingBox, stroke_width: f32) {
    let color = Rgb(self.box_color);
    let half = stroke_width / 2.0;
    let stroke = stroke_width.round().max(1.0) as u32;
    let outer_w = (bbox.width().abs() + stroke_width).round().max(1.0) as u32;
    let outer_h = (bbox.height().abs() + stroke_width).round().max(1.0) as u32;

    let left = (bbox.left.min(bbox.right) - half).round() as i32;
    let top = (bbox.top.min(bbox.bottom) - half).round() as i32;
    let right = (bbox.left.max(bbox.right) - half).round() as i32;
    let bottom = (bbox.top.max(bbox.bottom) - half).round() as i32;

    // 上、下、左、右四条边
    draw_filled_rect_mut(image, Rect::at(left, top).of_size(outer_w, stroke), color);
    draw_filled_rect_mut(image, Rect::at(left, bottom).of_size(outer_w, stroke), color);
    draw_filled_rect_mut(image, Rect::at(left, top).of_size(stroke, outer_h), color);
    draw_filled_rect_mut(image, Rect::at(right, top).of_size(stroke, outer_h), color);
  }

  // (x, baseline) 为文字基线起点
  fn draw_label(&self, image: &mut RgbImage, label: &str, x: f32, baseline: f32, text_size: f32) {
    let Some(font) = self.font.as_ref() else {
      return;
    };

    let scale = PxScale::from(text_size.max(1.0));
    let ascent = font.as_scaled(scale).ascent();
    draw_text_mut(
      image,
      Rgb(self.label_color),
      x.round() as i32,
      (baseline - ascent).round() as i32,
      scale,
      font,
      label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

  fn labels() -> LabelTable {
    ["???", "person", "bicycle", "car", "dog"].into_iter().collect()
  }

  #[test]
  fn bbox_uses_top_left_bottom_right_order() {
    let bbox = map_bbox([0.25, 0.5, 0.75, 1.0], 200.0, 100.0);
    assert_eq!(bbox, BoundingBox::new(100.0, 25.0, 200.0, 75.0));
  }

  #[test]
  fn only_scores_above_threshold_are_kept() {
    let output = SsdOutput::new(
      vec![0.0, 0.0, 0.5, 0.5].repeat(4),
      vec![1.0, 2.0, 3.0, 4.0],
      vec![0.9, 0.5, 0.2, 0.51],
    )
    .unwrap();

    let objects = Overlay::default()
      .detect_objects(&output, &labels(), 100, 100)
      .unwrap();
    let names: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(names, vec!["person", "dog"]);
    assert_eq!(objects[0].bounding_box, BoundingBox::new(0.0, 0.0, 50.0, 50.0));
  }

  #[test]
  fn unknown_class_is_reported_only_when_drawn() {
    let output = SsdOutput::new(vec![0.0; 8], vec![99.0, 42.0], vec![0.1, 0.8]).unwrap();

    let result = Overlay::default().detect_objects(&output, &labels(), 10, 10);
    assert!(matches!(
      result,
      Err(OverlayError::UnknownClass { index: 1, class, labels: 5 }) if class == 42.0
    ));
  }

  #[test]
  fn negative_or_nan_class_is_reported() {
    for class in [-1.0, f32::NAN, f32::INFINITY] {
      let output = SsdOutput::new(vec![0.0; 4], vec![class], vec![0.9]).unwrap();
      let result = Overlay::default().detect_objects(&output, &labels(), 10, 10);
      assert!(
        matches!(result, Err(OverlayError::UnknownClass { index: 0, .. })),
        "class {} was not reported",
        class
      );
    }
  }

  #[test]
  fn nan_score_is_not_above_threshold() {
    let output = SsdOutput::new(vec![0.1, 0.1, 0.5, 0.5], vec![1.0], vec![f32::NAN]).unwrap();
    let objects = Overlay::default()
      .detect_objects(&output, &labels(), 100, 100)
      .unwrap();
    assert!(objects.is_empty());
  }

  #[test]
  fn render_draws_box_on_a_copy() {
    let source = RgbImage::from_pixel(170, 170, WHITE);
    let output = SsdOutput::new(vec![0.2, 0.2, 0.8, 0.8], vec![3.0], vec![0.95]).unwrap();

    let annotated = Overlay::default()
      .render(&source, &output, &labels())
      .unwrap();

    assert_eq!(annotated.objects.len(), 1);
    assert_eq!(annotated.objects[0].label, "car");
    // 线宽 170/85 = 2，矩形为 (34, 34) - (136, 136)，线条覆盖边两侧各 1 像素
    let red = Rgb(BOX_COLOR);
    assert_eq!(annotated.image.get_pixel(80, 34), &red);
    assert_eq!(annotated.image.get_pixel(34, 80), &red);
    assert_eq!(annotated.image.get_pixel(135, 80), &red);
    assert_eq!(annotated.image.get_pixel(136, 80), &red);
    assert_eq!(annotated.image.get_pixel(80, 135), &red);
    assert_eq!(annotated.image.get_pixel(80, 136), &red);
    assert_eq!(annotated.image.get_pixel(136, 136), &red);
    assert_eq!(annotated.image.get_pixel(138, 80), &WHITE);
    assert_eq!(annotated.image.get_pixel(80, 138), &WHITE);
    assert_eq!(annotated.image.get_pixel(85, 85), &WHITE);
    assert_eq!(source.get_pixel(80, 34), &WHITE);
  }

  #[test]
  fn label_is_drawn_above_box_when_font_available() {
    let overlay = Overlay::default().with_system_font();
    if !overlay.has_font() {
      return;
    }

    let source = RgbImage::from_pixel(170, 170, WHITE);
    let output = SsdOutput::new(vec![0.2, 0.2, 0.8, 0.8], vec![3.0], vec![0.95]).unwrap();
    let annotated = overlay.render(&source, &output, &labels()).unwrap();

    // 文字基线位于矩形左上角，文字在上边线之上
    let blue = (34..90)
      .flat_map(|x| (0..32).map(move |y| (x, y)))
      .filter(|&(x, y)| {
        let p = annotated.image.get_pixel(x, y);
        p[2] > p[0].saturating_add(50) && p[2] > p[1].saturating_add(50)
      })
      .count();
    assert!(blue > 0, "no label pixels above the box");
  }

  #[test]
  fn nothing_above_threshold_leaves_image_untouched() {
    let source = RgbImage::from_pixel(64, 48, WHITE);
    let output = SsdOutput::new(vec![0.1, 0.1, 0.9, 0.9], vec![1.0], vec![0.4]).unwrap();

    let annotated = Overlay::default()
      .render(&source, &output, &labels())
      .unwrap();
    assert!(annotated.objects.is_empty());
    assert_eq!(annotated.image, source);
  }

  #[test]
  fn custom_threshold() {
    let output = SsdOutput::new(vec![0.0; 4], vec![1.0], vec![0.4]).unwrap();
    let objects = Overlay::default()
      .with_threshold(0.3)
      .detect_objects(&output, &labels(), 10, 10)
      .unwrap();
    assert_eq!(objects.len(), 1);
  }
}
