use rayon::prelude::*;

use crate::layers::{Module, Param, Pass};
use crate::math::tensor::Tensor;

/// Spatial bookkeeping shared by the forward and backward passes.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    in_c: usize,
    in_h: usize,
    in_w: usize,
    out_c: usize,
    out_h: usize,
    out_w: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl Geometry {
    fn in_len(&self) -> usize {
        self.in_c * self.in_h * self.in_w
    }

    fn out_len(&self) -> usize {
        self.out_c * self.out_h * self.out_w
    }

    fn kernel_len(&self) -> usize {
        self.in_c * self.kernel * self.kernel
    }

    /// Input coordinate hit by output position `o` and kernel offset `k`, if
    /// it falls inside the (unpadded) input.
    fn source(&self, o: usize, k: usize, limit: usize) -> Option<usize> {
        let pos = (o * self.stride + k) as isize - self.padding as isize;
        if pos < 0 || pos as usize >= limit {
            None
        } else {
            Some(pos as usize)
        }
    }
}

/// 2-D convolution over `[B, C, H, W]` inputs with square kernels.
///
/// Weight shape `[out_c, in_c, k, k]`. Samples of a batch are processed in
/// parallel on the rayon pool.
#[derive(Debug)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
    pub weight: Param,
    pub bias: Option<Param>,
    input: Option<Tensor>,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, stride: usize, padding: usize) -> Conv2d {
        let fan_in = in_channels * kernel * kernel;
        Conv2d {
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            weight: Param::new(Tensor::he(&[out_channels, in_channels, kernel, kernel], fan_in)),
            bias: Some(Param::new(Tensor::zeros(&[out_channels]))),
            input: None,
        }
    }

    /// Convolution without a bias term, for use in front of batch-norm.
    pub fn without_bias(in_channels: usize, out_channels: usize, kernel: usize, stride: usize, padding: usize) -> Conv2d {
        Conv2d { bias: None, ..Conv2d::new(in_channels, out_channels, kernel, stride, padding) }
    }

    fn geometry(&self, input: &Tensor) -> Geometry {
        assert_eq!(input.rank(), 4, "Conv2d expects [B, C, H, W], got {:?}", input.shape);
        assert_eq!(
            input.shape[1], self.in_channels,
            "Conv2d expects {} channels, got {}",
            self.in_channels, input.shape[1]
        );
        let (in_h, in_w) = (input.shape[2], input.shape[3]);
        assert!(
            in_h + 2 * self.padding >= self.kernel && in_w + 2 * self.padding >= self.kernel,
            "Conv2d kernel {} larger than padded input {}x{}",
            self.kernel, in_h, in_w
        );
        Geometry {
            in_c: self.in_channels,
            in_h,
            in_w,
            out_c: self.out_channels,
            out_h: (in_h + 2 * self.padding - self.kernel) / self.stride + 1,
            out_w: (in_w + 2 * self.padding - self.kernel) / self.stride + 1,
            kernel: self.kernel,
            stride: self.stride,
            padding: self.padding,
        }
    }
}

impl Module for Conv2d {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        let g = self.geometry(input);
        let k = g.kernel;
        let weight = &self.weight.value.data;
        let bias = self.bias.as_ref().map(|b| b.value.data.as_slice());
        let mut out = Tensor::zeros(&[input.batch(), g.out_c, g.out_h, g.out_w]);

        out.data
            .par_chunks_mut(g.out_len())
            .zip(input.data.par_chunks(g.in_len()))
            .for_each(|(y, x)| {
                for oc in 0..g.out_c {
                    let b = bias.map_or(0.0, |b| b[oc]);
                    let w_oc = &weight[oc * g.kernel_len()..(oc + 1) * g.kernel_len()];
                    for oy in 0..g.out_h {
                        for ox in 0..g.out_w {
                            let mut acc = b;
                            for ic in 0..g.in_c {
                                for ky in 0..k {
                                    let Some(iy) = g.source(oy, ky, g.in_h) else { continue };
                                    let x_row = (ic * g.in_h + iy) * g.in_w;
                                    let w_row = (ic * k + ky) * k;
                                    for kx in 0..k {
                                        if let Some(ix) = g.source(ox, kx, g.in_w) {
                                            acc += w_oc[w_row + kx] * x[x_row + ix];
                                        }
                                    }
                                }
                            }
                            y[(oc * g.out_h + oy) * g.out_w + ox] = acc;
                        }
                    }
                }
            });

        if pass.is_training() {
            self.input = Some(input.clone());
        }
        out
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let input = self.input.as_ref().expect("Conv2d::backward called without a training forward pass");
        let g = self.geometry(input);
        let k = g.kernel;
        let batch = input.batch();
        let weight = &self.weight.value.data;

        // ∂L/∂x, one independent chunk per sample.
        let mut grad_input = Tensor::zeros(&input.shape);
        grad_input
            .data
            .par_chunks_mut(g.in_len())
            .zip(grad_output.data.par_chunks(g.out_len()))
            .for_each(|(gx, gy)| {
                for oc in 0..g.out_c {
                    let w_oc = &weight[oc * g.kernel_len()..(oc + 1) * g.kernel_len()];
                    for oy in 0..g.out_h {
                        for ox in 0..g.out_w {
                            let gv = gy[(oc * g.out_h + oy) * g.out_w + ox];
                            if gv == 0.0 {
                                continue;
                            }
                            for ic in 0..g.in_c {
                                for ky in 0..k {
                                    let Some(iy) = g.source(oy, ky, g.in_h) else { continue };
                                    let x_row = (ic * g.in_h + iy) * g.in_w;
                                    let w_row = (ic * k + ky) * k;
                                    for kx in 0..k {
                                        if let Some(ix) = g.source(ox, kx, g.in_w) {
                                            gx[x_row + ix] += gv * w_oc[w_row + kx];
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            });

        // ∂L/∂W, one independent chunk per output channel.
        self.weight
            .grad
            .data
            .par_chunks_mut(g.kernel_len())
            .enumerate()
            .for_each(|(oc, gw)| {
                for n in 0..batch {
                    let x = input.sample(n);
                    let gy = grad_output.sample(n);
                    for oy in 0..g.out_h {
                        for ox in 0..g.out_w {
                            let gv = gy[(oc * g.out_h + oy) * g.out_w + ox];
                            if gv == 0.0 {
                                continue;
                            }
                            for ic in 0..g.in_c {
                                for ky in 0..k {
                                    let Some(iy) = g.source(oy, ky, g.in_h) else { continue };
                                    let x_row = (ic * g.in_h + iy) * g.in_w;
                                    let w_row = (ic * k + ky) * k;
                                    for kx in 0..k {
                                        if let Some(ix) = g.source(ox, kx, g.in_w) {
                                            gw[w_row + kx] += gv * x[x_row + ix];
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            });

        if let Some(bias) = self.bias.as_mut() {
            let plane = g.out_h * g.out_w;
            for n in 0..batch {
                let gy = grad_output.sample(n);
                for (oc, gb) in bias.grad.data.iter_mut().enumerate() {
                    *gb += gy[oc * plane..(oc + 1) * plane].iter().sum::<f64>();
                }
            }
        }

        grad_input
    }

    fn collect_params<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Param)>) {
        out.push((format!("{}weight", prefix), &self.weight));
        if let Some(bias) = &self.bias {
            out.push((format!("{}bias", prefix), bias));
        }
    }

    fn collect_params_mut<'a>(&'a mut self, prefix: &str, out: &mut Vec<(String, &'a mut Param)>) {
        out.push((format!("{}weight", prefix), &mut self.weight));
        if let Some(bias) = &mut self.bias {
            out.push((format!("{}bias", prefix), bias));
        }
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}
