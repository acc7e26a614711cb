use quadlearn::{
    config::ControllerConfig,
    episode::{ResetCause, SpawnBox},
    learner::{DeepQLearner, Learner, RandomLearner},
    physics::{Physics, RawKinematics, RigidBody, World},
    Controller, Orientation, Point, Vector,
};
use rand::{rngs::StdRng, SeedableRng};

fn build<L: Learner>(config: &ControllerConfig, learner: L) -> Controller<World, L> {
    let mut world = World::new(&config.world);
    let body = world.add_body(RigidBody::new(
        config.quad.mass,
        config.quad.half_extents(),
        config.quad.collision_radius,
    ));
    world.set_kinematics(body, RawKinematics::at_rest(Point::new(0.0, 3.0, 0.0)));
    Controller::new(config, world, body, learner)
}

fn seeded() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.seed = Some(42);
    config
}

#[test]
fn random_flight_keeps_invariants() {
    let config = seeded();
    let mut controller = build(&config, RandomLearner::new(StdRng::seed_from_u64(1)));
    let bounds = SpawnBox::from_config(&config.episode);
    let limit = config.episode.tilt_limit;

    let mut prev_dwell = 0;
    for _ in 0..3000 {
        let report = controller.tick(1.0 / 60.0).unwrap();
        assert!(controller
            .actuators()
            .levels()
            .iter()
            .all(|l| (0.0..=1.0).contains(l)));
        assert!((report.training_error - (report.post.training - report.captured.training)).abs() < 1e-12);
        assert!(report.post.diagnostic.abs() <= 1.0);

        let status = report.episode;
        if status.terminal {
            assert_eq!(status.dwell, prev_dwell + 1);
        } else {
            assert_eq!(status.dwell, 0);
        }
        prev_dwell = status.dwell;

        if let Some(cause) = status.reset {
            if cause == ResetCause::Dwell {
                assert!(status.dwell > config.episode.max_dwell_ticks);
            }
            let kin = controller.physics().kinematics(controller.body());
            assert!(bounds.contains(&kin.position));
            assert_eq!(kin.orientation, Orientation::identity());
            assert_eq!(kin.linear_velocity, Vector::zeros());
            assert_eq!(controller.actuators().levels(), &[0.37; 4]);
        } else {
            let state = controller.state();
            assert_eq!(status.terminal, state.roll.abs() > limit || state.pitch.abs() > limit);
        }
    }
    assert_eq!(controller.learner().updates(), 3000);
    // About nine random respawns are expected over this many ticks.
    assert!(controller.resets() > 0);
}

#[test]
fn deep_q_learner_trains_through_controller() {
    let mut config = seeded();
    config.learner.start_learn_threshold = 50;
    config.learner.learning_steps_burnin = 100;
    config.learner.learning_steps_total = 1000;
    config.learner.hidden_layers = vec![16];

    let learner = DeepQLearner::new(config.learner.clone(), StdRng::seed_from_u64(7));
    let mut controller = build(&config, learner);
    for _ in 0..500 {
        controller.tick(config.timestep.timestep(60.0)).unwrap();
    }
    let learner = controller.learner();
    assert_eq!(learner.age(), 500);
    assert!(learner.latest_loss().is_some());
    assert!(learner.epsilon() < 1.0);

    let blob = controller.snapshot().unwrap();
    let fresh = DeepQLearner::new(config.learner.clone(), StdRng::seed_from_u64(8));
    let mut other = build(&config, fresh);
    other.restore(&blob).unwrap();
    other.tick(1.0 / 60.0).unwrap();

    config.learner.hidden_layers = vec![8, 8];
    let mismatched = DeepQLearner::new(config.learner.clone(), StdRng::seed_from_u64(9));
    let mut third = build(&config, mismatched);
    assert!(third.restore(&blob).is_err());
}

#[test]
fn fixed_timestep_replays_exactly() {
    let run = || {
        let config = seeded();
        let mut controller = build(&config, RandomLearner::new(StdRng::seed_from_u64(3)));
        (0..400)
            .map(|_| controller.tick(1.0 / 45.0).unwrap().training_error)
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn stopped_controller_returns_collaborators() {
    let config = seeded();
    let mut controller = build(&config, RandomLearner::new(StdRng::seed_from_u64(3)));
    controller.tick(1.0 / 60.0).unwrap();
    let body = controller.body();
    let (world, learner) = controller.into_parts();
    assert_eq!(learner.updates(), 1);
    // One tick of near free fall from the start height.
    assert!(world.kinematics(body).position.y < 3.0);
}
