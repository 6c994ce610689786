use serde::{Serialize, Deserialize};

use crate::layers::{
    BatchNorm2d, Conv2d, Flatten, GlobalAvgPool, Linear, MaxPool2d, Relu, ResidualBlock, Sequential,
};
use crate::network::network::Network;

/// Side length of the square single-channel images every architecture takes.
pub const INPUT_SIDE: usize = 28;
/// Number of output classes.
pub const NUM_CLASSES: usize = 10;

/// The fixed set of trainable architectures.
///
/// - `Mlp`    — 784 → 128 → 64 → 10, ReLU between layers. Fast, ignores
///              spatial structure.
/// - `LeNet`  — LeNet-5 style CNN (two 5×5 conv + max-pool stages, three
///              fully-connected layers), about 60k parameters.
/// - `ResNet` — 18-layer residual network with batch-norm, narrowed to
///              16/32/64/128 channels for 28×28 inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Mlp,
    LeNet,
    ResNet,
}

impl Architecture {
    /// Case-insensitive lookup. Unknown names fall back to `Mlp`.
    pub fn from_name(name: &str) -> Architecture {
        match name.trim().to_ascii_lowercase().as_str() {
            "lenet" => Architecture::LeNet,
            "resnet" => Architecture::ResNet,
            _ => Architecture::Mlp,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Mlp => "mlp",
            Architecture::LeNet => "lenet",
            Architecture::ResNet => "resnet",
        }
    }

    pub fn build(&self) -> Network {
        let body = match self {
            Architecture::Mlp => mlp(),
            Architecture::LeNet => lenet(),
            Architecture::ResNet => resnet(),
        };
        Network::new(*self, body)
    }
}

/// Builds a fresh, randomly initialized network for `name`.
pub fn create_architecture(name: &str) -> Network {
    Architecture::from_name(name).build()
}

fn mlp() -> Sequential {
    Sequential::new()
        .with("flatten", Flatten::new())
        .with("fc1", Linear::new(INPUT_SIDE * INPUT_SIDE, 128))
        .with("relu1", Relu::new())
        .with("fc2", Linear::new(128, 64))
        .with("relu2", Relu::new())
        .with("fc3", Linear::new(64, NUM_CLASSES))
}

fn lenet() -> Sequential {
    // 1x28x28 -conv1(pad 2)-> 6x28x28 -pool-> 6x14x14 -conv2-> 16x10x10 -pool-> 16x5x5
    Sequential::new()
        .with("conv1", Conv2d::new(1, 6, 5, 1, 2))
        .with("relu1", Relu::new())
        .with("pool1", MaxPool2d::new(2))
        .with("conv2", Conv2d::new(6, 16, 5, 1, 0))
        .with("relu2", Relu::new())
        .with("pool2", MaxPool2d::new(2))
        .with("flatten", Flatten::new())
        .with("fc1", Linear::new(16 * 5 * 5, 120))
        .with("relu3", Relu::new())
        .with("fc2", Linear::new(120, 84))
        .with("relu4", Relu::new())
        .with("fc3", Linear::new(84, NUM_CLASSES))
}

fn resnet_stage(in_channels: usize, out_channels: usize, stride: usize) -> Sequential {
    Sequential::new()
        .with("0", ResidualBlock::new(in_channels, out_channels, stride))
        .with("1", ResidualBlock::new(out_channels, out_channels, 1))
}

fn resnet() -> Sequential {
    // 28x28 -> 28 -> 14 -> 7 -> 4 spatially.
    Sequential::new()
        .with("conv1", Conv2d::without_bias(1, 16, 3, 1, 1))
        .with("bn1", BatchNorm2d::new(16))
        .with("relu", Relu::new())
        .with("layer1", resnet_stage(16, 16, 1))
        .with("layer2", resnet_stage(16, 32, 2))
        .with("layer3", resnet_stage(32, 64, 2))
        .with("layer4", resnet_stage(64, 128, 2))
        .with("avgpool", GlobalAvgPool::new())
        .with("fc", Linear::new(128, NUM_CLASSES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    #[test]
    fn unknown_names_fall_back_to_mlp() {
        assert_eq!(Architecture::from_name("transformer"), Architecture::Mlp);
        assert_eq!(Architecture::from_name(""), Architecture::Mlp);
        assert_eq!(Architecture::from_name("LeNet"), Architecture::LeNet);
        assert_eq!(create_architecture("nope").architecture(), Architecture::Mlp);
    }

    #[test]
    fn every_architecture_maps_images_to_class_logits() {
        for arch in [Architecture::Mlp, Architecture::LeNet, Architecture::ResNet] {
            let mut net = arch.build();
            let out = net.forward(&Tensor::zeros(&[2, 1, INPUT_SIDE, INPUT_SIDE]));
            assert_eq!(out.shape, vec![2, NUM_CLASSES], "{:?}", arch);
        }
    }

    #[test]
    fn lenet_parameter_names() {
        let net = Architecture::LeNet.build();
        let names: Vec<String> = net.params().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "conv1.weight", "conv1.bias", "conv2.weight", "conv2.bias",
                "fc1.weight", "fc1.bias", "fc2.weight", "fc2.bias", "fc3.weight", "fc3.bias",
            ]
        );
    }

    #[test]
    fn resnet_has_eighteen_weighted_layers() {
        let net = Architecture::ResNet.build();
        let params = net.params();
        // stem conv + 16 block convs + fc; projection shortcuts are not counted
        let weighted = params
            .iter()
            .filter(|(n, p)| n.ends_with(".weight") && p.value.rank() != 1 && !n.contains("downsample"))
            .count();
        assert_eq!(weighted, 18);
        assert!(params.iter().any(|(n, _)| n == "layer2.0.downsample.0.weight"));
    }
}
