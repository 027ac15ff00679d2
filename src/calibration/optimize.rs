// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/calibration/optimize.rs - 有界 Nelder–Mead 优化
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

//! 无导数的有界最小化。搜索在单位超立方体中进行，每个试探点都投影回边界内；
//! 单纯形收缩到阈值以下后以当前最优点为中心重建单纯形，直到重启不再带来改进。

use tracing::debug;

use crate::cancel::CancelToken;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;
const INITIAL_STEP: f64 = 0.1;
const RESTART_STEP: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum<const N: usize> {
  pub x: [f64; N],
  pub value: f64,
  pub iterations: usize,
  pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct BoundedNelderMead<const N: usize> {
  lower: [f64; N],
  upper: [f64; N],
  max_iterations: usize,
  tolerance: f64,
  restarts: usize,
}

type Vertex<const N: usize> = ([f64; N], f64);

impl<const N: usize> BoundedNelderMead<N> {
  pub fn new(lower: [f64; N], upper: [f64; N]) -> Self {
    Self {
      lower,
      upper,
      max_iterations: 2000,
      tolerance: 1e-9,
      restarts: 8,
    }
  }

  pub fn max_iterations(mut self, max_iterations: usize) -> Self {
    self.max_iterations = max_iterations;
    self
  }

  pub fn tolerance(mut self, tolerance: f64) -> Self {
    self.tolerance = tolerance;
    self
  }

  pub fn restarts(mut self, restarts: usize) -> Self {
    self.restarts = restarts;
    self
  }

  fn to_unit(&self, x: &[f64; N]) -> [f64; N] {
    std::array::from_fn(|i| {
      let span = self.upper[i] - self.lower[i];
      if span > 0.0 {
        ((x[i] - self.lower[i]) / span).clamp(0.0, 1.0)
      } else {
        0.0
      }
    })
  }

  fn from_unit(&self, u: &[f64; N]) -> [f64; N] {
    std::array::from_fn(|i| self.lower[i] + u[i] * (self.upper[i] - self.lower[i]))
  }

  /// 起点在单位坐标下，沿每个坐标轴向内偏移 `step` 得到其余顶点
  fn simplex<F: FnMut(&[f64; N]) -> f64>(
    &self,
    origin: [f64; N],
    step: f64,
    f: &mut F,
  ) -> Vec<Vertex<N>> {
    let mut vertices = Vec::with_capacity(N + 1);
    vertices.push((origin, self.eval(f, &origin)));
    for i in 0..N {
      let mut u = origin;
      u[i] = if u[i] + step <= 1.0 {
        u[i] + step
      } else {
        u[i] - step
      };
      vertices.push((u, self.eval(f, &u)));
    }
    vertices
  }

  fn eval<F: FnMut(&[f64; N]) -> f64>(&self, f: &mut F, u: &[f64; N]) -> f64 {
    let value = f(&self.from_unit(u));
    if value.is_nan() { f64::INFINITY } else { value }
  }

  fn towards(&self, from: &[f64; N], to: &[f64; N], t: f64) -> [f64; N] {
    std::array::from_fn(|i| (from[i] + t * (to[i] - from[i])).clamp(0.0, 1.0))
  }

  /// 单纯形在单位坐标下相对最优顶点的最大切比雪夫距离
  fn size(vertices: &[Vertex<N>]) -> f64 {
    let best = &vertices[0].0;
    vertices[1..]
      .iter()
      .flat_map(|(u, _)| u.iter().zip(best).map(|(a, b)| (a - b).abs()))
      .fold(0.0, f64::max)
  }

  pub fn minimize<F: FnMut(&[f64; N]) -> f64>(
    &self,
    mut f: F,
    start: [f64; N],
    cancel: &CancelToken,
  ) -> Result<Minimum<N>, Cancelled> {
    let mut iterations = 0usize;
    let mut origin = self.to_unit(&start);
    let mut step = INITIAL_STEP;
    let mut best_value = f64::INFINITY;
    let mut converged = false;

    for round in 0..=self.restarts {
      let (vertex, run_converged) = self.run(&mut f, origin, step, &mut iterations, cancel)?;
      let improvement = best_value - vertex.1;
      debug!(
        "第 {} 轮: 目标值 {:.6}, 改进 {:.3e}, 迭代 {}",
        round, vertex.1, improvement, iterations
      );
      let stalled = improvement.abs() <= self.tolerance * (1.0 + vertex.1.abs());
      if vertex.1 < best_value {
        best_value = vertex.1;
        origin = vertex.0;
      }
      converged = run_converged;
      if !run_converged || stalled {
        break;
      }
      step = RESTART_STEP;
    }

    Ok(Minimum {
      x: self.from_unit(&origin),
      value: best_value,
      iterations,
      converged,
    })
  }

  fn run<F: FnMut(&[f64; N]) -> f64>(
    &self,
    f: &mut F,
    origin: [f64; N],
    step: f64,
    iterations: &mut usize,
    cancel: &CancelToken,
  ) -> Result<(Vertex<N>, bool), Cancelled> {
    let mut vertices = self.simplex(origin, step, f);

    loop {
      vertices.sort_by(|lhs, rhs| lhs.1.total_cmp(&rhs.1));
      if Self::size(&vertices) <= self.tolerance {
        return Ok((vertices[0], true));
      }
      if *iterations >= self.max_iterations {
        return Ok((vertices[0], false));
      }
      if cancel.is_cancelled() {
        return Err(Cancelled);
      }
      *iterations += 1;

      let worst = vertices[N];
      let centroid: [f64; N] = std::array::from_fn(|i| {
        vertices[..N].iter().map(|(u, _)| u[i]).sum::<f64>() / N as f64
      });

      let reflected = self.towards(&centroid, &worst.0, -REFLECTION);
      let reflected_value = self.eval(f, &reflected);

      if reflected_value < vertices[0].1 {
        let expanded = self.towards(&centroid, &worst.0, -EXPANSION);
        let expanded_value = self.eval(f, &expanded);
        vertices[N] = if expanded_value < reflected_value {
          (expanded, expanded_value)
        } else {
          (reflected, reflected_value)
        };
        continue;
      }
      if reflected_value < vertices[N - 1].1 {
        vertices[N] = (reflected, reflected_value);
        continue;
      }

      let (contracted, contracted_value) = if reflected_value < worst.1 {
        let outside = self.towards(&centroid, &reflected, CONTRACTION);
        (outside, self.eval(f, &outside))
      } else {
        let inside = self.towards(&centroid, &worst.0, CONTRACTION);
        (inside, self.eval(f, &inside))
      };
      if contracted_value < worst.1.min(reflected_value) {
        vertices[N] = (contracted, contracted_value);
        continue;
      }

      let best = vertices[0].0;
      for vertex in vertices.iter_mut().skip(1) {
        let u = self.towards(&best, &vertex.0, SHRINK);
        *vertex = (u, self.eval(f, &u));
      }
    }
  }
}
