//! cargo mpirun --np 4 --example transpose2d
use mpi::topology::Communicator;
use ndarray::Array2;
use pencil_redist::{Pencil, Subcomm};

fn main() {
    tracing_subscriber::fmt::init();
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert!(world.size() == 4, "Run with 4 processors");

    let shape = [8, 8];
    // One distributed axis; the pencil inserts the singleton at its
    // aligned axis.
    let subcomm = Subcomm::new(&world, 1).unwrap();
    let row_pencil = Pencil::new(&subcomm, &shape, -1).unwrap();
    let col_pencil = row_pencil.pencil(0).unwrap();
    assert_eq!(row_pencil.subshape(), [2, 8]);
    assert_eq!(col_pencil.subshape(), [8, 2]);

    let plan = row_pencil.transfer::<f64>(&col_pencil).unwrap();

    let src = tagged_array(&row_pencil);
    let mut dst = array_for(&col_pencil);
    plan.forward(&src, &mut dst).unwrap();
    assert_eq!(dst, tagged_array(&col_pencil));

    let mut back = array_for(&row_pencil);
    plan.backward(&dst, &mut back).unwrap();
    assert_eq!(back, src);

    if world.rank() == 0 {
        println!("transpose2d: verified on {} ranks", world.size());
    }
}

fn array_for(pencil: &Pencil) -> Array2<f64> {
    let n = pencil.subshape();
    Array2::zeros((n[0], n[1]))
}

/// Each element tagged with its global coordinate.
fn tagged_array(pencil: &Pencil) -> Array2<f64> {
    let mut data = array_for(pencil);
    for i in pencil.subrange(0) {
        let ii = i - pencil.substart()[0];
        for j in pencil.subrange(1) {
            let jj = j - pencil.substart()[1];
            data[[ii, jj]] = (i * 10 + j) as f64;
        }
    }
    data
}
