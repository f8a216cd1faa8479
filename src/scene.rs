// 该文件是 Wuzhi （物知） 项目的一部分。
// src/scene.rs - 当前图像的检测结果与点击命中
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

use tracing::debug;

/// 像素坐标下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }

  pub fn is_empty(&self) -> bool {
    self.left >= self.right || self.top >= self.bottom
  }

  /// 左闭右开，空矩形不包含任何点
  pub fn contains(&self, x: f32, y: f32) -> bool {
    !self.is_empty() && x >= self.left && x < self.right && y >= self.top && y < self.bottom
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
  pub bounding_box: BoundingBox,
  pub label: String,
}

/// 当前显示图像上的检测结果，每次检测整体替换
#[derive(Debug, Default)]
pub struct Scene {
  objects: Vec<DetectedObject>,
  generation: u64,
}

impl Scene {
  pub fn new(objects: Vec<DetectedObject>) -> Self {
    Self {
      objects,
      generation: 1,
    }
  }

  pub fn replace(&mut self, objects: Vec<DetectedObject>) {
    self.objects = objects;
    self.generation += 1;
    debug!(
      "检测结果已更新: 第 {} 代, {} 个物体",
      self.generation,
      self.objects.len()
    );
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn objects(&self) -> &[DetectedObject] {
    &self.objects
  }

  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  /// 按检测顺序线性查找，返回第一个包含该点的物体
  pub fn hit_test(&self, x: f32, y: f32) -> Option<&DetectedObject> {
    self
      .objects
      .iter()
      .find(|object| object.bounding_box.contains(x, y))
  }
}
